//! Agent personas: the static catalog consulted on every turn.

pub mod catalog;
pub mod definition;
pub mod registry;

pub use catalog::{builtin_agents, DEFAULT_MODEL, MODERATOR_NAME};
pub use definition::{AgentDefinition, AgentKey, AgentRole};
pub use registry::{AgentRegistry, RegistryError};

use crate::config::{AgentsConfig, PersonaConfig};

/// Factory: build the registry from config.
///
/// An empty `personas` list selects the built-in catalog. Configured personas
/// without explicit `transfer_targets` get star edges: moderator to every
/// specialist, each specialist back to the moderator.
pub fn create_registry(config: &AgentsConfig) -> Result<AgentRegistry, RegistryError> {
    if config.personas.is_empty() {
        return AgentRegistry::new(builtin_agents(&config.model));
    }

    let moderator = config
        .personas
        .iter()
        .find(|p| p.role == AgentRole::Moderator)
        .map(|p| p.name.trim().to_string());
    let specialists: Vec<String> = config
        .personas
        .iter()
        .filter(|p| p.role == AgentRole::Specialist)
        .map(|p| p.name.trim().to_string())
        .collect();

    let agents = config
        .personas
        .iter()
        .map(|persona| persona_definition(persona, config, moderator.as_deref(), &specialists))
        .collect();

    AgentRegistry::new(agents)
}

fn persona_definition(
    persona: &PersonaConfig,
    config: &AgentsConfig,
    moderator: Option<&str>,
    specialists: &[String],
) -> AgentDefinition {
    let transfer_targets = persona.transfer_targets.clone().unwrap_or_else(|| match persona.role {
        AgentRole::Moderator => specialists.to_vec(),
        AgentRole::Specialist => moderator.map(str::to_string).into_iter().collect(),
    });

    AgentDefinition {
        name: persona.name.clone(),
        model: persona.model.clone().unwrap_or_else(|| config.model.clone()),
        instructions: persona
            .instructions
            .clone()
            .unwrap_or_else(|| catalog::specialist_instructions(persona.name.trim())),
        role: persona.role,
        transfer_targets,
        directives: persona.directives.clone(),
    }
}
