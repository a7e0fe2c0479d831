use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use warp::ws::{Message, WebSocket};

use crate::connection::Connection;
use crate::error::ChatError;
use crate::history::{ChatMessage, MessageLog};
use crate::messages::ServerMessage;
use crate::registry::{Outbound, SessionId, SessionRegistry, Shutdown};
use crate::store::{UserStore, UserView};

pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// Per-session outbound queue length. A session whose queue fills up is
    /// disconnected.
    pub outbound_capacity: usize,
    /// Reject joins from connections without a logged in identity.
    pub require_auth: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerOptions {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            require_auth: false,
        }
    }
}

struct Shared {
    registry: SessionRegistry,
    history: MessageLog,
}

/// The broadcast engine. Registry, history and online flags only change
/// while `shared` is locked, and every fan-out happens under the same lock.
pub struct Server {
    shared: Mutex<Shared>,
    store: Arc<dyn UserStore>,
    options: ServerOptions,
}

impl Server {
    pub fn new(store: Arc<dyn UserStore>, options: ServerOptions) -> Self {
        Server {
            shared: Mutex::new(Shared {
                registry: SessionRegistry::new(),
                history: MessageLog::new(),
            }),
            store,
            options,
        }
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    pub fn options(&self) -> ServerOptions {
        self.options
    }

    /// Registers a new connection. The returned receiver fires once the
    /// session is dropped from the registry, including forced disconnects.
    pub async fn attach(&self, tx: Outbound) -> (SessionId, Shutdown) {
        let mut shared = self.shared.lock().await;
        let (id, shutdown) = shared.registry.attach(tx);
        debug!("Session {} attached ({} live)", id, shared.registry.len());
        (id, shutdown)
    }

    pub async fn on_join(
        &self,
        session_id: SessionId,
        username: &str,
    ) -> Result<(Vec<ChatMessage>, Vec<UserView>), ChatError> {
        let mut shared = self.shared.lock().await;

        if self.store.get_user(username).await.is_none() {
            return Err(ChatError::UnknownUser(username.to_string()));
        }
        shared.registry.register(session_id, username)?;
        self.store.set_online(username, true).await;

        let history = shared.history.snapshot();
        let roster = self.roster().await;

        let mut failed = Vec::new();
        Self::unicast(
            &shared.registry,
            session_id,
            &ServerMessage::Init {
                messages: history.clone(),
                users: roster.clone(),
            },
            &mut failed,
        );
        Self::fan_out(
            &shared.registry,
            &ServerMessage::UserJoined {
                username: username.to_string(),
                users: roster.clone(),
            },
            &mut failed,
        );
        info!("User {} joined. Online users: {}", username, roster.len());

        self.evict(&mut shared, failed).await;
        Ok((history, roster))
    }

    pub async fn on_message(
        &self,
        session_id: SessionId,
        content: &str,
    ) -> Result<ChatMessage, ChatError> {
        let mut shared = self.shared.lock().await;

        let username = shared.registry.binding(session_id)?.to_string();
        let message = shared.history.append(&username, content)?;
        debug!("New message {} from {}", message.id, username);

        let mut failed = Vec::new();
        Self::fan_out(
            &shared.registry,
            &ServerMessage::Message {
                message: message.clone(),
            },
            &mut failed,
        );

        self.evict(&mut shared, failed).await;
        Ok(message)
    }

    /// Removes the session and, if it had joined, announces the departure.
    /// Calling it again for the same session does nothing.
    pub async fn on_leave(&self, session_id: SessionId) {
        let mut shared = self.shared.lock().await;
        let mut failed = Vec::new();
        self.depart(&mut shared, session_id, &mut failed).await;
        self.evict(&mut shared, failed).await;
    }

    pub async fn notify(&self, session_id: SessionId, message: &ServerMessage) {
        let mut shared = self.shared.lock().await;
        let mut failed = Vec::new();
        Self::unicast(&shared.registry, session_id, message, &mut failed);
        self.evict(&mut shared, failed).await;
    }

    pub async fn history(&self) -> Vec<ChatMessage> {
        self.shared.lock().await.history.snapshot()
    }

    pub async fn live_sessions(&self) -> usize {
        self.shared.lock().await.registry.len()
    }

    async fn roster(&self) -> Vec<UserView> {
        self.store.online_users().await.iter().map(UserView::from).collect()
    }

    async fn depart(
        &self,
        shared: &mut Shared,
        session_id: SessionId,
        failed: &mut Vec<SessionId>,
    ) {
        let Some(mut session) = shared.registry.unregister(session_id) else {
            return;
        };
        let username = session.username.take();
        session.shut_down();
        let Some(username) = username else {
            debug!("Unbound session {} detached", session_id);
            return;
        };

        if !shared.registry.is_online(&username) {
            self.store.set_online(&username, false).await;
        }
        let roster = self.roster().await;
        info!("User {} disconnected. Online users: {}", username, roster.len());

        Self::fan_out(
            &shared.registry,
            &ServerMessage::UserLeft {
                username,
                users: roster,
            },
            failed,
        );
    }

    /// Departures caused by a failed delivery can fail further deliveries,
    /// so keep going until nothing is left.
    async fn evict(&self, shared: &mut Shared, mut pending: Vec<SessionId>) {
        while let Some(session_id) = pending.pop() {
            self.depart(shared, session_id, &mut pending).await;
        }
    }

    fn fan_out(
        registry: &SessionRegistry,
        message: &ServerMessage,
        failed: &mut Vec<SessionId>,
    ) {
        if let Ok(msg) = serde_json::to_string(message) {
            let msg = Message::text(msg);
            registry.for_each_session(|session_id, tx| {
                if !Self::deliver(session_id, tx, msg.clone()) {
                    failed.push(session_id);
                }
            });
        }
    }

    fn unicast(
        registry: &SessionRegistry,
        session_id: SessionId,
        message: &ServerMessage,
        failed: &mut Vec<SessionId>,
    ) {
        if let Ok(msg) = serde_json::to_string(message) {
            if let Some(tx) = registry.sender(session_id) {
                if !Self::deliver(session_id, tx, Message::text(msg)) {
                    failed.push(session_id);
                }
            }
        }
    }

    fn deliver(session_id: SessionId, tx: &Outbound, message: Message) -> bool {
        match tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full for session {}, disconnecting", session_id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Session {} is gone, cleaning up", session_id);
                false
            }
        }
    }

    pub async fn handle_connection(self: Arc<Self>, ws: WebSocket, identity: Option<String>) {
        let (mut ws_tx, mut ws_rx) = ws.split();
        let (tx, mut rx) = mpsc::channel(self.options.outbound_capacity);
        let (session_id, mut shutdown) = self.attach(tx).await;
        info!("New WebSocket connection: {}", session_id);

        let mut writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = ws_tx.send(message).await {
                    warn!("Failed to send WebSocket message: {}", e);
                    return;
                }
            }
            let _ = ws_tx.close().await;
        });

        let mut connection = Connection::new(session_id, Arc::clone(&self), identity);
        loop {
            tokio::select! {
                incoming = ws_rx.next() => match incoming {
                    Some(Ok(msg)) => {
                        if msg.is_close() {
                            break;
                        }
                        if let Ok(text) = msg.to_str() {
                            connection.handle_text(text).await;
                        } else if msg.is_binary() {
                            let reason = "binary frames are not supported".to_string();
                            connection.reject(ChatError::Malformed(reason)).await;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error on {}: {}", session_id, e);
                        break;
                    }
                    None => break,
                },
                _ = &mut writer => {
                    debug!("Outbound side of {} finished", session_id);
                    break;
                }
                _ = &mut shutdown => {
                    warn!("Session {} was dropped by the server, closing socket", session_id);
                    break;
                }
            }
        }

        // Pending frames are discarded; a stalled peer must not keep the
        // socket alive.
        writer.abort();
        drop(ws_rx);
        connection.close().await;
        info!("Connection {} closed", session_id);
    }
}
