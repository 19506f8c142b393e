//! Routing traits and types for deciding which agent answers a turn.

use serde::{Deserialize, Serialize};

use crate::agents::AgentKey;

/// How the next agent was chosen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCause {
    /// The message named a reachable agent's directive.
    Directive,
    /// The moderator handed off to a randomly chosen specialist.
    RandomHandoff,
    /// The active agent stays.
    Unchanged,
}

/// Result of evaluating one user message against the transfer graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub agent: AgentKey,
    pub cause: TransitionCause,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.cause != TransitionCause::Unchanged
    }
}

/// Chooses one specialist out of `count` candidates for a random handoff.
pub trait SpecialistSelector: Send + Sync {
    /// Index in `0..count`. Callers never pass zero.
    fn select(&self, count: usize) -> usize;

    /// The name of this selector implementation.
    fn name(&self) -> &str;
}
