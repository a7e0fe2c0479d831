//! Username/password verification and cookie sessions.
//!
//! Passwords are stored as Argon2id PHC strings. A successful register or
//! login issues a random token that the HTTP layer hands out as the `sid`
//! cookie; the WebSocket upgrade resolves it back to a username.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use log::info;
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use tokio::sync::RwLock;

use crate::error::ChatError;
use crate::store::{UserStore, UserView};

pub const SESSION_COOKIE: &str = "sid";
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const TOKEN_LENGTH: usize = 32;

struct AuthSession {
    username: String,
    expires_at: DateTime<Utc>,
}

pub struct Authenticator {
    store: Arc<dyn UserStore>,
    sessions: RwLock<HashMap<String, AuthSession>>,
    ttl: Duration,
}

impl Authenticator {
    pub fn new(store: Arc<dyn UserStore>, ttl: Duration) -> Self {
        Authenticator {
            store,
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Creates the user and logs them in.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(UserView, String), ChatError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(ChatError::Malformed("username and password are required".to_string()));
        }
        if self.store.get_user(username).await.is_some() {
            return Err(ChatError::DuplicateUsername);
        }

        let hash = hash_password(password)?;
        let identity = self.store.create_user(username, &hash).await?;
        info!("Registered user {}", identity.username);

        let token = self.issue(&identity.username).await;
        Ok((UserView::from(&identity), token))
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(UserView, String), ChatError> {
        let identity = self
            .store
            .get_user(username.trim())
            .await
            .ok_or(ChatError::InvalidCredentials)?;
        verify_password(password, &identity.password_hash)?;

        let token = self.issue(&identity.username).await;
        Ok((UserView::from(&identity), token))
    }

    pub async fn logout(&self, token: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(token);
    }

    pub async fn current_identity(&self, token: &str) -> Result<UserView, ChatError> {
        let username = {
            let mut sessions = self.sessions.write().await;
            match sessions.get(token) {
                Some(session) if session.expires_at > Utc::now() => session.username.clone(),
                Some(_) => {
                    sessions.remove(token);
                    return Err(ChatError::Unauthenticated);
                }
                None => return Err(ChatError::Unauthenticated),
            }
        };

        let identity = self
            .store
            .get_user(&username)
            .await
            .ok_or(ChatError::Unauthenticated)?;
        Ok(UserView::from(&identity))
    }

    async fn issue(&self, username: &str) -> String {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();
        let now = Utc::now();
        let ttl =
            chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::days(1));
        let expires_at = now + ttl;

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, session| session.expires_at > now);
        sessions.insert(
            token.clone(),
            AuthSession {
                username: username.to_string(),
                expires_at,
            },
        );
        token
    }
}

pub fn hash_password(password: &str) -> Result<String, ChatError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ChatError::Hashing(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<(), ChatError> {
    let parsed = PasswordHash::new(hash).map_err(|_| ChatError::InvalidCredentials)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| ChatError::InvalidCredentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn authenticator(ttl: Duration) -> Authenticator {
        Authenticator::new(Arc::new(MemoryStore::new()), ttl)
    }

    #[test]
    fn hashes_verify_only_the_original_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert_eq!(verify_password("battery staple", &hash), Err(ChatError::InvalidCredentials));
        assert_eq!(verify_password("x", "not a hash"), Err(ChatError::InvalidCredentials));
    }

    #[tokio::test]
    async fn register_then_login() {
        let auth = authenticator(DEFAULT_SESSION_TTL);
        let (user, token) = auth.register("alice", "secret").await.unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(token.len(), TOKEN_LENGTH);
        assert_eq!(auth.current_identity(&token).await.unwrap().username, "alice");

        assert_eq!(
            auth.register("alice", "other").await.unwrap_err(),
            ChatError::DuplicateUsername
        );
        assert_eq!(
            auth.login("alice", "wrong").await.unwrap_err(),
            ChatError::InvalidCredentials
        );
        assert_eq!(
            auth.login("nobody", "secret").await.unwrap_err(),
            ChatError::InvalidCredentials
        );

        let (_, second) = auth.login("alice", "secret").await.unwrap();
        assert_ne!(second, token);
    }

    #[tokio::test]
    async fn blank_registrations_are_rejected() {
        let auth = authenticator(DEFAULT_SESSION_TTL);
        assert!(matches!(auth.register("  ", "secret").await, Err(ChatError::Malformed(_))));
        assert!(matches!(auth.register("alice", "").await, Err(ChatError::Malformed(_))));
    }

    #[tokio::test]
    async fn logout_and_expiry_end_the_session() {
        let auth = authenticator(DEFAULT_SESSION_TTL);
        let (_, token) = auth.register("alice", "secret").await.unwrap();
        auth.logout(&token).await;
        assert_eq!(auth.current_identity(&token).await, Err(ChatError::Unauthenticated));

        let expired = authenticator(Duration::ZERO);
        let (_, token) = expired.register("bob", "secret").await.unwrap();
        assert_eq!(expired.current_identity(&token).await, Err(ChatError::Unauthenticated));
    }

    #[tokio::test]
    async fn expired_tokens_are_purged_on_login() {
        let auth = authenticator(Duration::ZERO);
        auth.register("alice", "secret").await.unwrap();
        for _ in 0..5 {
            auth.login("alice", "secret").await.unwrap();
        }
        assert_eq!(auth.sessions.read().await.len(), 1);

        let live = authenticator(DEFAULT_SESSION_TTL);
        live.register("bob", "secret").await.unwrap();
        live.login("bob", "secret").await.unwrap();
        assert_eq!(live.sessions.read().await.len(), 2);
    }
}
