//! Validated, read-only agent catalog.
//!
//! The registry is built once at startup. Every structural rule of the
//! transfer graph is checked in [`AgentRegistry::new`], so nothing downstream
//! has to handle a malformed catalog at request time.

use std::collections::HashSet;

use thiserror::Error;

use super::definition::{AgentDefinition, AgentKey, AgentRole};

/// Startup-time registry failures. Both are fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("invalid agent configuration: {0}")]
    Configuration(String),
}

/// Catalog of agent personas with a star-shaped transfer graph.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    agents: Vec<AgentDefinition>,
    moderator: AgentKey,
    specialists: Vec<AgentKey>,
    /// Resolved transfer targets per agent, in registration order.
    edges: Vec<Vec<AgentKey>>,
}

impl AgentRegistry {
    /// Validate `agents` and build the registry.
    ///
    /// Registration order is preserved. It is the tie-break order for
    /// directive matching.
    pub fn new(agents: Vec<AgentDefinition>) -> Result<Self, RegistryError> {
        if agents.is_empty() {
            return Err(RegistryError::Configuration(
                "agent registry is empty".to_string(),
            ));
        }

        let mut agents = agents;
        for agent in &mut agents {
            agent.name = agent.name.trim().to_string();
            agent.directives = agent
                .directives
                .iter()
                .map(|d| d.trim().to_lowercase())
                .collect();
        }

        let mut seen = HashSet::new();
        for agent in &agents {
            if agent.name.is_empty() {
                return Err(RegistryError::Configuration(
                    "agent name must not be empty".to_string(),
                ));
            }
            if !seen.insert(agent.name.as_str()) {
                return Err(RegistryError::Configuration(format!(
                    "duplicate agent name: {}",
                    agent.name
                )));
            }
        }

        let moderators: Vec<usize> = agents
            .iter()
            .enumerate()
            .filter(|(_, a)| a.role == AgentRole::Moderator)
            .map(|(i, _)| i)
            .collect();
        let moderator = match moderators.as_slice() {
            [only] => AgentKey(*only),
            [] => {
                return Err(RegistryError::Configuration(
                    "no moderator agent defined".to_string(),
                ))
            }
            _ => {
                return Err(RegistryError::Configuration(format!(
                    "exactly one moderator is allowed, found {}",
                    moderators.len()
                )))
            }
        };

        let specialists: Vec<AgentKey> = (0..agents.len())
            .filter(|&i| i != moderator.0)
            .map(AgentKey)
            .collect();
        if specialists.is_empty() {
            return Err(RegistryError::Configuration(
                "at least one specialist agent is required".to_string(),
            ));
        }

        validate_directives(&agents)?;

        let mut edges = Vec::with_capacity(agents.len());
        for agent in &agents {
            let mut targets = Vec::with_capacity(agent.transfer_targets.len());
            for target in &agent.transfer_targets {
                let idx = agents
                    .iter()
                    .position(|a| a.name == target.trim())
                    .ok_or_else(|| RegistryError::UnknownAgent(target.clone()))?;
                if !targets.contains(&AgentKey(idx)) {
                    targets.push(AgentKey(idx));
                }
            }
            targets.sort();
            edges.push(targets);
        }

        if edges[moderator.0] != specialists {
            let missing: Vec<&str> = specialists
                .iter()
                .filter(|k| !edges[moderator.0].contains(k))
                .map(|k| agents[k.0].name.as_str())
                .collect();
            return Err(RegistryError::Configuration(if missing.is_empty() {
                format!(
                    "moderator '{}' may only transfer to specialists",
                    agents[moderator.0].name
                )
            } else {
                format!(
                    "moderator '{}' cannot reach: {}",
                    agents[moderator.0].name,
                    missing.join(", ")
                )
            }));
        }

        for key in &specialists {
            if edges[key.0] != [moderator] {
                return Err(RegistryError::Configuration(format!(
                    "specialist '{}' must transfer back to '{}' and nowhere else",
                    agents[key.0].name, agents[moderator.0].name
                )));
            }
        }

        Ok(Self {
            agents,
            moderator,
            specialists,
            edges,
        })
    }

    /// Look up an agent definition by exact name.
    pub fn resolve(&self, name: &str) -> Result<&AgentDefinition, RegistryError> {
        self.key_of(name).map(|key| self.get(key))
    }

    /// Look up an agent key by exact name.
    pub fn key_of(&self, name: &str) -> Result<AgentKey, RegistryError> {
        self.agents
            .iter()
            .position(|a| a.name == name)
            .map(AgentKey)
            .ok_or_else(|| RegistryError::UnknownAgent(name.to_string()))
    }

    /// Definition for a key issued by this registry.
    pub fn get(&self, key: AgentKey) -> &AgentDefinition {
        &self.agents[key.0]
    }

    pub fn moderator(&self) -> &AgentDefinition {
        self.get(self.moderator)
    }

    pub fn moderator_key(&self) -> AgentKey {
        self.moderator
    }

    /// All non-moderator agents, in registration order.
    pub fn specialists(&self) -> Vec<&AgentDefinition> {
        self.specialists.iter().map(|k| self.get(*k)).collect()
    }

    pub fn specialist_keys(&self) -> &[AgentKey] {
        &self.specialists
    }

    /// Agents reachable from `from`, in registration order.
    pub fn transfer_targets(&self, from: AgentKey) -> &[AgentKey] {
        &self.edges[from.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (AgentKey, &AgentDefinition)> {
        self.agents.iter().enumerate().map(|(i, a)| (AgentKey(i), a))
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Every agent needs a directive, and no directive may contain another
/// agent's directive.
fn validate_directives(agents: &[AgentDefinition]) -> Result<(), RegistryError> {
    for agent in agents {
        if agent.directives.is_empty() {
            return Err(RegistryError::Configuration(format!(
                "agent '{}' has no directive",
                agent.name
            )));
        }
        for directive in &agent.directives {
            if directive.is_empty() || directive.chars().any(char::is_whitespace) {
                return Err(RegistryError::Configuration(format!(
                    "agent '{}' has an invalid directive {directive:?}",
                    agent.name
                )));
            }
        }
    }

    for (i, a) in agents.iter().enumerate() {
        for b in agents.iter().skip(i + 1) {
            for da in &a.directives {
                for db in &b.directives {
                    if da.contains(db.as_str()) || db.contains(da.as_str()) {
                        return Err(RegistryError::Configuration(format!(
                            "directive '{da}' ({}) overlaps '{db}' ({})",
                            a.name, b.name
                        )));
                    }
                }
            }
        }
    }

    Ok(())
}
