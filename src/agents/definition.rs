//! Agent persona types.

use serde::{Deserialize, Serialize};

/// Position of an agent in the transfer graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Starts every session and may hand off to any specialist.
    Moderator,
    /// Answers in persona; can only transfer back to the moderator.
    Specialist,
}

/// Index of an agent inside the [`AgentRegistry`](super::AgentRegistry) that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentKey(pub(crate) usize);

impl AgentKey {
    /// Registration position of the agent.
    pub fn index(self) -> usize {
        self.0
    }
}

/// An immutable agent persona.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentDefinition {
    /// Unique display name, e.g. `"H. L. Mencken"`.
    pub name: String,
    /// Model identifier passed to the generation backend.
    pub model: String,
    /// System prompt defining the persona.
    pub instructions: String,
    pub role: AgentRole,
    /// Names of the agents this one may hand the conversation to.
    pub transfer_targets: Vec<String>,
    /// Command tokens (e.g. `/mencken`) that select this agent as a transfer target.
    /// Stored lowercase.
    pub directives: Vec<String>,
}

impl AgentDefinition {
    pub fn is_moderator(&self) -> bool {
        self.role == AgentRole::Moderator
    }
}
