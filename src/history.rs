use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChatError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub content: String,
    pub username: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only chat history. Ids start at 1 and are never reused.
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Vec<ChatMessage>,
    last_id: u64,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, username: &str, content: &str) -> Result<ChatMessage, ChatError> {
        if content.trim().is_empty() {
            return Err(ChatError::EmptyContent);
        }

        let id = self.last_id + 1;
        if let Some(last) = self.messages.last() {
            assert!(last.id < id, "message log ids must be strictly increasing");
        }

        let message = ChatMessage {
            id,
            content: content.to_string(),
            username: username.to_string(),
            timestamp: Utc::now(),
        };
        self.last_id = id;
        self.messages.push(message.clone());
        Ok(message)
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut log = MessageLog::new();
        let first = log.append("alice", "hi").unwrap();
        let second = log.append("bob", "hello").unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(second.username, "bob");
        assert!(first.timestamp <= second.timestamp);
    }

    #[test]
    fn blank_content_is_rejected_without_consuming_an_id() {
        let mut log = MessageLog::new();
        assert_eq!(log.append("alice", "").unwrap_err(), ChatError::EmptyContent);
        assert_eq!(log.append("alice", " \t\n ").unwrap_err(), ChatError::EmptyContent);
        assert!(log.is_empty());

        let message = log.append("alice", "  padded  ").unwrap();
        assert_eq!(message.id, 1);
        assert_eq!(message.content, "  padded  ");
    }

    #[test]
    fn snapshot_preserves_append_order() {
        let mut log = MessageLog::new();
        for text in ["one", "two", "three"] {
            log.append("alice", text).unwrap();
        }

        let contents: Vec<String> = log.snapshot().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
        assert_eq!(log.len(), 3);
    }
}
