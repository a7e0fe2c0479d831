use serde::{Deserialize, Serialize};

use crate::history::ChatMessage;
use crate::store::UserView;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "join")]
    Join {
        username: String,
    },
    #[serde(rename = "message")]
    Message {
        content: String,
    },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "init")]
    Init {
        messages: Vec<ChatMessage>,
        users: Vec<UserView>,
    },
    #[serde(rename = "message")]
    Message {
        message: ChatMessage,
    },
    #[serde(rename = "userJoined")]
    UserJoined {
        username: String,
        users: Vec<UserView>,
    },
    #[serde(rename = "userLeft")]
    UserLeft {
        username: String,
        users: Vec<UserView>,
    },
    #[serde(rename = "error")]
    Error {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_events_are_tagged_by_type() {
        let join: ClientMessage =
            serde_json::from_value(json!({"type": "join", "username": "alice"})).unwrap();
        assert_eq!(join, ClientMessage::Join { username: "alice".into() });

        let message: ClientMessage =
            serde_json::from_str(r#"{"type":"message","content":"hi"}"#).unwrap();
        assert_eq!(message, ClientMessage::Message { content: "hi".into() });
    }

    #[test]
    fn missing_fields_and_unknown_types_do_not_parse() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"message"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"leave"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>("not json").is_err());
    }

    #[test]
    fn presence_events_use_camel_case_tags() {
        let event = ServerMessage::UserLeft {
            username: "bob".into(),
            users: Vec::new(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"type": "userLeft", "username": "bob", "users": []}));
    }
}
