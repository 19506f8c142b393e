//! In-memory persistence backend.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::traits::{PersistedState, Persistence};
use crate::sessions::ChatMessage;

/// Process-local store backed by mutex-protected hash maps. Survives logout
/// but not a restart.
pub struct InMemoryPersistence {
    history: Mutex<HashMap<String, Vec<ChatMessage>>>,
    states: Mutex<HashMap<String, PersistedState>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(HashMap::new()),
            states: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn load_history(&self, username: &str, limit: usize) -> anyhow::Result<Vec<ChatMessage>> {
        let history = self.history.lock();
        let Some(messages) = history.get(username) else {
            return Ok(Vec::new());
        };
        let skip = messages.len().saturating_sub(limit);
        Ok(messages[skip..].to_vec())
    }

    async fn append_turn(
        &self,
        username: &str,
        user_text: Option<&str>,
        assistant_text: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut history = self.history.lock();
        let entry = history.entry(username.to_string()).or_default();
        if let Some(text) = user_text {
            entry.push(ChatMessage::user(text));
        }
        if let Some(text) = assistant_text {
            entry.push(ChatMessage::assistant(text));
        }
        Ok(())
    }

    async fn load_state(&self, username: &str) -> anyhow::Result<Option<PersistedState>> {
        Ok(self.states.lock().get(username).cloned())
    }

    async fn save_state(&self, username: &str, state: &PersistedState) -> anyhow::Result<()> {
        self.states
            .lock()
            .insert(username.to_string(), state.clone());
        Ok(())
    }

    async fn clear_state(&self, username: &str) -> anyhow::Result<()> {
        self.states.lock().remove(username);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::Role;
    use chrono::Utc;

    #[tokio::test]
    async fn append_and_load_history_in_order() {
        let store = InMemoryPersistence::new();
        store.append_turn("alice", None, Some("greeting")).await.unwrap();
        store.append_turn("alice", Some("q1"), Some("a1")).await.unwrap();
        store.append_turn("alice", Some("q2"), None).await.unwrap();

        let history = store.load_history("alice", 100).await.unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["greeting", "q1", "a1", "q2"]);
        assert_eq!(history[0].role, Role::Assistant);
        assert_eq!(history[3].role, Role::User);
    }

    #[tokio::test]
    async fn load_history_keeps_latest_entries() {
        let store = InMemoryPersistence::new();
        for i in 0..5 {
            store
                .append_turn("alice", Some(&format!("q{i}")), None)
                .await
                .unwrap();
        }
        let history = store.load_history("alice", 2).await.unwrap();
        assert_eq!(history, vec![ChatMessage::user("q3"), ChatMessage::user("q4")]);
        assert!(store.load_history("bob", 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn state_save_load_clear() {
        let store = InMemoryPersistence::new();
        let state = PersistedState {
            active_agent: "Pynchon".into(),
            last_interaction: Utc::now(),
        };
        store.save_state("alice", &state).await.unwrap();
        assert_eq!(store.load_state("alice").await.unwrap(), Some(state));

        store.clear_state("alice").await.unwrap();
        assert!(store.load_state("alice").await.unwrap().is_none());
        assert_eq!(store.name(), "memory");
    }
}
