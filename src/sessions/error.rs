use thiserror::Error;

use crate::agents::RegistryError;

/// Failures surfaced by the session manager.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Unknown or revoked token, or a token whose state is gone.
    #[error("invalid session")]
    InvalidSession,

    /// The generation call failed. The user's message is kept in history,
    /// so the caller may simply resend.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl SessionError {
    /// Whether resending the same request can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GenerationFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_generation_failures_are_retryable() {
        assert!(SessionError::GenerationFailed("timeout".into()).is_retryable());
        assert!(!SessionError::InvalidSession.is_retryable());
        let err: SessionError = RegistryError::UnknownAgent("Poe".into()).into();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("Poe"));
    }
}
