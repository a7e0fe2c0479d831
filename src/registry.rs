use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;
use warp::ws::Message;

use crate::error::ChatError;

pub type SessionId = Uuid;
pub type Outbound = mpsc::Sender<Message>;
/// Resolves once the session has been dropped from the registry.
pub type Shutdown = oneshot::Receiver<()>;

#[derive(Debug)]
pub struct Session {
    pub tx: Outbound,
    pub username: Option<String>,
    pub connected_at: DateTime<Utc>,
    shutdown: oneshot::Sender<()>,
}

impl Session {
    /// Tells the connection task to stop. A no-op if it is already gone.
    pub fn shut_down(self) {
        let _ = self.shutdown.send(());
    }
}

/// Live connections keyed by session id. Not synchronized on its own; the
/// broadcast engine owns it behind its lock.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an unbound session for a freshly accepted connection.
    pub fn attach(&mut self, tx: Outbound) -> (SessionId, Shutdown) {
        let id = Uuid::new_v4();
        let (shutdown, shutdown_rx) = oneshot::channel();
        let previous = self.sessions.insert(
            id,
            Session {
                tx,
                username: None,
                connected_at: Utc::now(),
                shutdown,
            },
        );
        assert!(previous.is_none(), "session id collision: {id}");
        (id, shutdown_rx)
    }

    pub fn register(&mut self, id: SessionId, username: &str) -> Result<(), ChatError> {
        let session = self.sessions.get_mut(&id).ok_or(ChatError::Closed)?;
        if session.username.is_some() {
            return Err(ChatError::DuplicateBinding);
        }
        session.username = Some(username.to_string());
        Ok(())
    }

    /// Removing a session twice is a no-op.
    pub fn unregister(&mut self, id: SessionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    /// Username bound to a live session.
    pub fn binding(&self, id: SessionId) -> Result<&str, ChatError> {
        let session = self.sessions.get(&id).ok_or(ChatError::Closed)?;
        session.username.as_deref().ok_or(ChatError::Unauthenticated)
    }

    pub fn sender(&self, id: SessionId) -> Option<&Outbound> {
        self.sessions.get(&id).map(|session| &session.tx)
    }

    pub fn is_online(&self, username: &str) -> bool {
        self.sessions
            .values()
            .any(|session| session.username.as_deref() == Some(username))
    }

    /// Point-in-time copy of every bound session's outbound queue.
    pub fn snapshot(&self) -> Vec<(SessionId, Outbound)> {
        self.sessions
            .iter()
            .filter(|(_, session)| session.username.is_some())
            .map(|(id, session)| (*id, session.tx.clone()))
            .collect()
    }

    pub fn for_each_session<F>(&self, mut f: F)
    where
        F: FnMut(SessionId, &Outbound),
    {
        for (id, tx) in self.snapshot() {
            f(id, &tx);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
