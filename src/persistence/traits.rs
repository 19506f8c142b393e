//! Persistence collaborator contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sessions::ChatMessage;

/// Per-user chat state kept between sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedState {
    /// Display name of the agent that answered last.
    pub active_agent: String,
    pub last_interaction: DateTime<Utc>,
}

/// Durable history and state store.
///
/// Every call is best effort. The in-memory conversation is authoritative
/// for a live session, so callers log failures and carry on.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// The most recent `limit` messages for `username`, oldest first.
    async fn load_history(&self, username: &str, limit: usize) -> anyhow::Result<Vec<ChatMessage>>;

    /// Record one turn. Either side may be absent: the greeting has no user
    /// text and a failed turn has no assistant text.
    async fn append_turn(
        &self,
        username: &str,
        user_text: Option<&str>,
        assistant_text: Option<&str>,
    ) -> anyhow::Result<()>;

    async fn load_state(&self, username: &str) -> anyhow::Result<Option<PersistedState>>;

    async fn save_state(&self, username: &str, state: &PersistedState) -> anyhow::Result<()>;

    /// Forget the user's chat state. History is kept.
    async fn clear_state(&self, username: &str) -> anyhow::Result<()>;

    /// The name of this persistence backend.
    fn name(&self) -> &str;
}
