pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod history;
pub mod messages;
pub mod registry;
pub mod routes;
pub mod server;
pub mod store;

use std::sync::Arc;

use auth::Authenticator;
use config::Config;
use routes::AppState;
use server::Server;
use store::{MemoryStore, UserStore};

/// Wires the in-memory store, broadcast engine and authenticator together.
pub fn app_state(config: &Config) -> AppState {
    let store: Arc<dyn UserStore> = Arc::new(MemoryStore::new());
    AppState {
        server: Arc::new(Server::new(Arc::clone(&store), config.server_options())),
        auth: Arc::new(Authenticator::new(store, config.session_ttl())),
        secure_cookies: config.secure_cookies,
    }
}
