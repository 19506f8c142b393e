//! Text-generation collaborator contract.

use async_trait::async_trait;

use crate::sessions::ChatMessage;

/// A backend that turns instructions plus history into the next assistant
/// message.
///
/// Implementations do not distinguish failure causes. Network, quota and
/// malformed-response errors all come back as a plain `anyhow::Error`.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a reply for `history`, whose last entry is the user's
    /// current message.
    async fn generate(
        &self,
        model: &str,
        instructions: &str,
        history: &[ChatMessage],
    ) -> anyhow::Result<String>;

    /// The name of this generator implementation.
    fn name(&self) -> &str;
}
