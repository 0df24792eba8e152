//! Session store keyed by conversation.
//!
//! Sessions are created on first use and live for the process lifetime.
//! Each one sits behind its own async mutex so events for a single chat are
//! applied one at a time, while different chats never contend.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::session::Session;

/// Conversation identity (Telegram chat id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatKey(pub i64);

impl fmt::Display for ChatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thread-safe and cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<DashMap<ChatKey, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the chat's session, creating an empty one if needed.
    pub fn session(&self, key: ChatKey) -> Arc<Mutex<Session>> {
        self.sessions
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(Session::new())))
            .clone()
    }

    /// Existing session only; never creates
    pub fn get(&self, key: ChatKey) -> Option<Arc<Mutex<Session>>> {
        self.sessions.get(&key).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_created_on_first_use() {
        let store = SessionStore::new();
        assert!(store.get(ChatKey(1)).is_none());

        let s = store.session(ChatKey(1));
        s.lock().await.set_categories("Food").unwrap();

        let again = store.session(ChatKey(1));
        assert_eq!(again.lock().await.categories(), ["Food"]);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_chats_are_isolated() {
        let store = SessionStore::new();
        store
            .session(ChatKey(1))
            .lock()
            .await
            .set_categories("Food")
            .unwrap();
        assert!(store.session(ChatKey(2)).lock().await.categories().is_empty());
    }
}
