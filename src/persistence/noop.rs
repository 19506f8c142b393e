use async_trait::async_trait;

use super::traits::{PersistedState, Persistence};
use crate::sessions::ChatMessage;

/// Backend that stores nothing. Every user looks new.
pub struct NoopPersistence;

#[async_trait]
impl Persistence for NoopPersistence {
    async fn load_history(&self, _username: &str, _limit: usize) -> anyhow::Result<Vec<ChatMessage>> {
        Ok(Vec::new())
    }

    async fn append_turn(
        &self,
        _username: &str,
        _user_text: Option<&str>,
        _assistant_text: Option<&str>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn load_state(&self, _username: &str) -> anyhow::Result<Option<PersistedState>> {
        Ok(None)
    }

    async fn save_state(&self, _username: &str, _state: &PersistedState) -> anyhow::Result<()> {
        Ok(())
    }

    async fn clear_state(&self, _username: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_forgets_everything() {
        let store = NoopPersistence;
        store.append_turn("alice", Some("hi"), Some("hello")).await.unwrap();
        assert!(store.load_history("alice", 10).await.unwrap().is_empty());
        assert!(store.load_state("alice").await.unwrap().is_none());
        assert_eq!(store.name(), "none");
    }
}
