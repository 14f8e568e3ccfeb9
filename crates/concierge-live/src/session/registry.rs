//! Process-wide map from user id to that user's live session.

use std::collections::HashMap;
use std::sync::Arc;

use concierge_common::SessionId;
use tokio::sync::RwLock;
use tracing::info;

use super::Session;

/// At most one session per user. Created empty at startup, drained on
/// shutdown, passed by value to whoever needs it.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `session` for `user_id`. A previous session is torn down
    /// (cleanups run, close requested) before the new one becomes visible.
    pub async fn set(&self, user_id: &str, session: Arc<Session>) {
        let mut map = self.sessions.write().await;
        if let Some(previous) = map.remove(user_id) {
            info!(user = %user_id, session = %previous.id, "Replacing live session");
            previous.teardown();
        }
        map.insert(user_id.to_owned(), session);
    }

    pub async fn get(&self, user_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(user_id).cloned()
    }

    /// Remove without teardown.
    pub async fn delete(&self, user_id: &str) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(user_id)
    }

    /// Remove and tear down. Returns whether a session was present.
    pub async fn evict(&self, user_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(user_id);
        match removed {
            Some(session) => {
                session.teardown();
                true
            }
            None => false,
        }
    }

    /// Remove and tear down only if `user_id` still maps to session `id`.
    /// A session that was already replaced is left alone.
    pub async fn remove_if_current(&self, user_id: &str, id: &SessionId) -> bool {
        let mut map = self.sessions.write().await;
        if map.get(user_id).is_some_and(|s| &s.id == id) {
            if let Some(session) = map.remove(user_id) {
                session.teardown();
            }
            return true;
        }
        false
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Tear down and remove every session. Returns how many there were.
    pub async fn drain(&self) -> usize {
        let drained: Vec<_> = self.sessions.write().await.drain().collect();
        for (user_id, session) in &drained {
            info!(user = %user_id, session = %session.id, "Closing live session");
            session.teardown();
        }
        drained.len()
    }
}
