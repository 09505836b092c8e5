// ABOUTME: In-memory TTL session store with periodic background expiry
// ABOUTME: Session ids are 32 random bytes, hex-encoded

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Claims kept for an authenticated user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(rename = "sub")]
    pub subject: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub user: UserInfo,
    pub expires_at: DateTime<Utc>,
}

/// In-memory session map with a fixed TTL. A background task sweeps
/// expired entries every five minutes; `get` also expires lazily.
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
    cleaner: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        let sessions: Arc<RwLock<HashMap<String, Session>>> = Arc::default();

        let swept = Arc::clone(&sessions);
        let cleaner = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                let now = Utc::now();
                swept.write().await.retain(|_, s| s.expires_at > now);
            }
        });

        Self {
            sessions,
            ttl,
            cleaner: Mutex::new(Some(cleaner)),
        }
    }

    /// Stores a new session and returns its id.
    pub async fn create(&self, user: UserInfo) -> String {
        let id = generate_session_id();
        let session = Session {
            id: id.clone(),
            user,
            expires_at: Utc::now()
                + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::zero()),
        };
        self.sessions.write().await.insert(id.clone(), session);
        id
    }

    /// Looks up a session, deleting it first if it has expired.
    pub async fn get(&self, id: &str) -> Option<Session> {
        let session = self.sessions.read().await.get(id).cloned()?;
        if session.expires_at <= Utc::now() {
            self.delete(id).await;
            return None;
        }
        Some(session)
    }

    pub async fn delete(&self, id: &str) {
        self.sessions.write().await.remove(id);
    }

    /// Cancels the background sweeper. Safe to call more than once.
    pub fn stop(&self) {
        if let Ok(mut guard) = self.cleaner.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.stop();
    }
}

fn generate_session_id() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserInfo {
        UserInfo {
            subject: "user-1".into(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
        }
    }

    #[tokio::test]
    async fn create_and_get_roundtrip() {
        let store = SessionStore::new(Duration::from_secs(3600));
        let id = store.create(user()).await;

        assert_eq!(id.len(), 64);
        let session = store.get(&id).await.expect("session present");
        assert_eq!(session.user.subject, "user-1");
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let store = SessionStore::new(Duration::from_secs(3600));
        let a = store.create(user()).await;
        let b = store.create(user()).await;
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn expired_session_is_deleted_on_get() {
        let store = SessionStore::new(Duration::ZERO);
        let id = store.create(user()).await;
        assert!(store.get(&id).await.is_none());
        // Second lookup hits the already-removed entry.
        assert!(store.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn delete_removes_session() {
        let store = SessionStore::new(Duration::from_secs(3600));
        let id = store.create(user()).await;
        store.delete(&id).await;
        assert!(store.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let store = SessionStore::new(Duration::from_secs(3600));
        store.stop();
        store.stop();
    }
}
