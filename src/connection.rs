use std::sync::Arc;

use log::debug;

use crate::error::ChatError;
use crate::messages::{ClientMessage, ServerMessage};
use crate::registry::SessionId;
use crate::server::Server;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Active { username: String },
    Closed,
}

/// Per-connection state machine. `identity` is the user resolved from the
/// session cookie at upgrade time, if any.
pub struct Connection {
    session_id: SessionId,
    server: Arc<Server>,
    identity: Option<String>,
    state: ConnectionState,
}

impl Connection {
    pub fn new(session_id: SessionId, server: Arc<Server>, identity: Option<String>) -> Self {
        Connection {
            session_id,
            server,
            identity,
            state: ConnectionState::Connected,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub async fn handle_text(&mut self, text: &str) {
        if self.state == ConnectionState::Closed {
            return;
        }

        let result = match serde_json::from_str::<ClientMessage>(text) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => Err(ChatError::Malformed(e.to_string())),
        };

        if let Err(e) = result {
            self.reject(e).await;
        }
    }

    /// Reports a failed event to this connection only. `Closed` means the
    /// server already dropped the session, so there is nobody to tell.
    pub async fn reject(&mut self, error: ChatError) {
        if error == ChatError::Closed {
            debug!("Session {} is no longer registered", self.session_id);
            self.state = ConnectionState::Closed;
            return;
        }

        debug!("Rejected event from {}: {}", self.session_id, error);
        let message = ServerMessage::Error {
            message: error.to_string(),
        };
        self.server.notify(self.session_id, &message).await;
    }

    pub async fn handle_event(&mut self, event: ClientMessage) -> Result<(), ChatError> {
        let active = match self.state {
            ConnectionState::Closed => return Ok(()),
            ConnectionState::Connected => false,
            ConnectionState::Active { .. } => true,
        };

        match (active, event) {
            (false, ClientMessage::Join { username }) => {
                self.authorize(&username)?;
                self.server.on_join(self.session_id, &username).await?;
                self.state = ConnectionState::Active { username };
                Ok(())
            }
            (true, ClientMessage::Join { .. }) => Err(ChatError::DuplicateBinding),
            (false, ClientMessage::Message { .. }) => Err(ChatError::Unauthenticated),
            (true, ClientMessage::Message { content }) => {
                self.server.on_message(self.session_id, &content).await.map(|_| ())
            }
        }
    }

    /// Runs at most once regardless of how the connection ended.
    pub async fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closed;
        self.server.on_leave(self.session_id).await;
    }

    fn authorize(&self, username: &str) -> Result<(), ChatError> {
        match &self.identity {
            Some(identity) if identity != username => Err(ChatError::IdentityMismatch),
            Some(_) => Ok(()),
            None if self.server.options().require_auth => Err(ChatError::Unauthenticated),
            None => Ok(()),
        }
    }
}
