//! Built-in SwarmChat personas.

use super::definition::{AgentDefinition, AgentRole};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const MODERATOR_NAME: &str = "Moderator";

/// Moderator directives. These are the back-edge for every specialist.
const MODERATOR_DIRECTIVES: &[&str] = &["/transfer_back", "/moderator"];

/// Specialists in registration order: (display name, directive).
const SPECIALISTS: &[(&str, &str)] = &[
    ("Hemingway", "/hemingway"),
    ("Pynchon", "/pynchon"),
    ("Emily Dickinson", "/dickinson"),
    ("Dale Carnegie", "/carnegie"),
    ("A Freudian Psychoanalyst", "/shrink"),
    ("A 1920s Flapper", "/flapper"),
    ("Bullwinkle J. Moose", "/bullwinkle"),
    ("Yogi Berra", "/yogi_berra"),
    ("Yogi Bhajan", "/yogi_bhajan"),
    ("H. L. Mencken", "/mencken"),
];

/// Instruction text shared by every specialist persona.
pub fn specialist_instructions(name: &str) -> String {
    format!(
        "Answer as {name}. Do not begin your answer with 'Ah'. \
         Introduce yourself by agent name."
    )
}

fn moderator_instructions(specialists: &[&str]) -> String {
    format!(
        "You are the moderator of SwarmChat. Welcome the user, find out what is on \
         their mind, and keep the conversation moving. Specialists available for a \
         handoff: {}. Keep a light and playful tone.",
        specialists.join(", ")
    )
}

/// The full built-in catalog: moderator first, then the specialists.
pub fn builtin_agents(model: &str) -> Vec<AgentDefinition> {
    let names: Vec<&str> = SPECIALISTS.iter().map(|(name, _)| *name).collect();

    let mut agents = Vec::with_capacity(SPECIALISTS.len() + 1);
    agents.push(AgentDefinition {
        name: MODERATOR_NAME.to_string(),
        model: model.to_string(),
        instructions: moderator_instructions(&names),
        role: AgentRole::Moderator,
        transfer_targets: names.iter().map(|n| (*n).to_string()).collect(),
        directives: MODERATOR_DIRECTIVES.iter().map(|d| (*d).to_string()).collect(),
    });

    for (name, directive) in SPECIALISTS {
        agents.push(AgentDefinition {
            name: (*name).to_string(),
            model: model.to_string(),
            instructions: specialist_instructions(name),
            role: AgentRole::Specialist,
            transfer_targets: vec![MODERATOR_NAME.to_string()],
            directives: vec![(*directive).to_string()],
        });
    }

    agents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentRegistry;

    #[test]
    fn builtin_catalog_passes_validation() {
        let registry = AgentRegistry::new(builtin_agents(DEFAULT_MODEL)).unwrap();
        assert_eq!(registry.moderator().name, MODERATOR_NAME);
        assert_eq!(registry.specialists().len(), 10);
        assert!(registry.iter().all(|(_, a)| a.model == DEFAULT_MODEL));
    }

    #[test]
    fn mencken_is_reachable_by_directive() {
        let registry = AgentRegistry::new(builtin_agents(DEFAULT_MODEL)).unwrap();
        let mencken = registry.resolve("H. L. Mencken").unwrap();
        assert_eq!(mencken.directives, ["/mencken"]);
        assert_eq!(mencken.transfer_targets, [MODERATOR_NAME]);
    }

    #[test]
    fn specialist_order_is_stable() {
        let agents = builtin_agents("m");
        assert_eq!(agents[1].name, "Hemingway");
        assert_eq!(agents.last().unwrap().name, "H. L. Mencken");
    }
}
