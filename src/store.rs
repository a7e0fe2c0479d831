use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ChatError;

#[derive(Debug, Clone)]
pub struct Identity {
    pub id: u64,
    pub username: String,
    pub password_hash: String,
    pub online: bool,
    pub avatar: Option<String>,
}

/// What clients get to see of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: u64,
    pub username: String,
    pub online: bool,
    pub avatar: Option<String>,
}

impl From<&Identity> for UserView {
    fn from(identity: &Identity) -> Self {
        UserView {
            id: identity.id,
            username: identity.username.clone(),
            online: identity.online,
            avatar: identity.avatar.clone(),
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, username: &str) -> Option<Identity>;

    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Identity, ChatError>;

    async fn set_online(&self, username: &str, online: bool);

    /// Online identities ordered by registration.
    async fn online_users(&self) -> Vec<Identity>;

    async fn update_avatar(&self, username: &str, avatar: &str) -> Result<(), ChatError>;
}

#[derive(Default)]
struct Users {
    by_name: HashMap<String, Identity>,
    last_id: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<Users>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user(&self, username: &str) -> Option<Identity> {
        let users = self.users.read().await;
        users.by_name.get(username).cloned()
    }

    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Identity, ChatError> {
        let mut users = self.users.write().await;
        if users.by_name.contains_key(username) {
            return Err(ChatError::DuplicateUsername);
        }

        users.last_id += 1;
        let identity = Identity {
            id: users.last_id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            online: false,
            avatar: None,
        };
        users.by_name.insert(username.to_string(), identity.clone());
        Ok(identity)
    }

    async fn set_online(&self, username: &str, online: bool) {
        let mut users = self.users.write().await;
        if let Some(identity) = users.by_name.get_mut(username) {
            identity.online = online;
        }
    }

    async fn online_users(&self) -> Vec<Identity> {
        let users = self.users.read().await;
        let mut online: Vec<Identity> = users
            .by_name
            .values()
            .filter(|identity| identity.online)
            .cloned()
            .collect();
        online.sort_by_key(|identity| identity.id);
        online
    }

    async fn update_avatar(&self, username: &str, avatar: &str) -> Result<(), ChatError> {
        let mut users = self.users.write().await;
        let identity = users
            .by_name
            .get_mut(username)
            .ok_or_else(|| ChatError::UnknownUser(username.to_string()))?;
        identity.avatar = Some(avatar.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_usernames_are_rejected() {
        let store = MemoryStore::new();
        let alice = store.create_user("alice", "hash").await.unwrap();
        assert_eq!(alice.id, 1);
        assert!(!alice.online);

        let err = store.create_user("alice", "other").await.unwrap_err();
        assert_eq!(err, ChatError::DuplicateUsername);
    }

    #[tokio::test]
    async fn online_users_follow_registration_order() {
        let store = MemoryStore::new();
        for name in ["carol", "alice", "bob"] {
            store.create_user(name, "hash").await.unwrap();
        }
        store.set_online("bob", true).await;
        store.set_online("carol", true).await;

        let names: Vec<String> = store
            .online_users()
            .await
            .into_iter()
            .map(|identity| identity.username)
            .collect();
        assert_eq!(names, vec!["carol", "bob"]);

        store.set_online("carol", false).await;
        assert_eq!(store.online_users().await.len(), 1);
    }

    #[tokio::test]
    async fn avatar_updates_require_a_known_user() {
        let store = MemoryStore::new();
        store.create_user("alice", "hash").await.unwrap();
        store.update_avatar("alice", "data:image/png;base64,AAAA").await.unwrap();

        let alice = store.get_user("alice").await.unwrap();
        assert_eq!(alice.avatar.as_deref(), Some("data:image/png;base64,AAAA"));
        assert!(matches!(
            store.update_avatar("nobody", "x").await,
            Err(ChatError::UnknownUser(_))
        ));
    }

    #[test]
    fn user_view_hides_the_credential() {
        let identity = Identity {
            id: 7,
            username: "alice".into(),
            password_hash: "$argon2id$secret".into(),
            online: true,
            avatar: None,
        };
        let json = serde_json::to_string(&UserView::from(&identity)).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"username\":\"alice\""));
    }
}
