use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::agents::{AgentKey, AgentRegistry, RegistryError};

/// How directive tokens are recognized inside a user message.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveMatching {
    /// Case-insensitive substring search anywhere in the text.
    #[default]
    Substring,
    /// The token must start the text or follow whitespace, and must be
    /// followed by a non-word character or the end of the text.
    Delimited,
}

/// A directive found in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveMatch {
    pub agent: AgentKey,
    pub token: String,
}

struct DirectiveEntry {
    agent: AgentKey,
    token: String,
    pattern: Option<Regex>,
}

/// Directive scanner built from a registry's tokens.
///
/// Entries keep registration order (agent order, then each agent's token
/// order), which is the tie-break when a message names several agents.
pub struct DirectiveMatcher {
    mode: DirectiveMatching,
    entries: Vec<DirectiveEntry>,
}

impl DirectiveMatcher {
    pub fn new(registry: &AgentRegistry, mode: DirectiveMatching) -> Result<Self, RegistryError> {
        let mut entries = Vec::new();
        for (agent, def) in registry.iter() {
            for token in &def.directives {
                let pattern = match mode {
                    DirectiveMatching::Substring => None,
                    DirectiveMatching::Delimited => Some(delimited_pattern(token)?),
                };
                entries.push(DirectiveEntry {
                    agent,
                    token: token.clone(),
                    pattern,
                });
            }
        }
        Ok(Self { mode, entries })
    }

    pub fn mode(&self) -> DirectiveMatching {
        self.mode
    }

    /// First directive in `text` whose agent is in `allowed`.
    ///
    /// Directives for agents outside `allowed` are ignored, not errors.
    pub fn find(&self, text: &str, allowed: &[AgentKey]) -> Option<DirectiveMatch> {
        let lowered = text.to_lowercase();
        self.entries
            .iter()
            .filter(|e| allowed.contains(&e.agent))
            .find(|e| match &e.pattern {
                Some(re) => re.is_match(&lowered),
                None => lowered.contains(e.token.as_str()),
            })
            .map(|e| DirectiveMatch {
                agent: e.agent,
                token: e.token.clone(),
            })
    }
}

fn delimited_pattern(token: &str) -> Result<Regex, RegistryError> {
    let source = format!(r"(?:^|\s){}(?:$|\W)", regex::escape(token));
    Regex::new(&source).map_err(|e| {
        RegistryError::Configuration(format!("directive '{token}' is not matchable: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{builtin_agents, DEFAULT_MODEL};

    fn registry() -> AgentRegistry {
        AgentRegistry::new(builtin_agents(DEFAULT_MODEL)).unwrap()
    }

    fn all(registry: &AgentRegistry) -> Vec<AgentKey> {
        registry.iter().map(|(k, _)| k).collect()
    }

    #[test]
    fn substring_match_is_case_insensitive() {
        let registry = registry();
        let matcher = DirectiveMatcher::new(&registry, DirectiveMatching::Substring).unwrap();
        let found = matcher.find("Hello /MENCKEN please", &all(&registry)).unwrap();
        assert_eq!(registry.get(found.agent).name, "H. L. Mencken");
        assert_eq!(found.token, "/mencken");
    }

    #[test]
    fn no_directive_returns_none() {
        let registry = registry();
        let matcher = DirectiveMatcher::new(&registry, DirectiveMatching::Substring).unwrap();
        assert!(matcher.find("just chatting", &all(&registry)).is_none());
    }

    #[test]
    fn registration_order_breaks_ties() {
        let registry = registry();
        let matcher = DirectiveMatcher::new(&registry, DirectiveMatching::Substring).unwrap();
        // Mencken is registered after Hemingway, regardless of position in the text.
        for _ in 0..10 {
            let found = matcher
                .find("/mencken or maybe /hemingway", &all(&registry))
                .unwrap();
            assert_eq!(registry.get(found.agent).name, "Hemingway");
        }
    }

    #[test]
    fn disallowed_agents_are_skipped() {
        let registry = registry();
        let matcher = DirectiveMatcher::new(&registry, DirectiveMatching::Substring).unwrap();
        let mencken = registry.key_of("H. L. Mencken").unwrap();
        let found = matcher
            .find("/hemingway then /mencken", &[mencken])
            .unwrap();
        assert_eq!(found.agent, mencken);
        assert!(matcher.find("/hemingway", &[mencken]).is_none());
    }

    #[test]
    fn substring_mode_matches_inside_words() {
        let registry = registry();
        let matcher = DirectiveMatcher::new(&registry, DirectiveMatching::Substring).unwrap();
        assert!(matcher
            .find("see http://x.org/menckenian/essays", &all(&registry))
            .is_some());
    }

    #[test]
    fn delimited_mode_requires_boundaries() {
        let registry = registry();
        let matcher = DirectiveMatcher::new(&registry, DirectiveMatching::Delimited).unwrap();
        let keys = all(&registry);
        assert_eq!(matcher.mode(), DirectiveMatching::Delimited);
        assert!(matcher.find("/mencken", &keys).is_some());
        assert!(matcher.find("hello /Mencken, are you there?", &keys).is_some());
        assert!(matcher.find("see http://x.org/menckenian/essays", &keys).is_none());
        assert!(matcher.find("a/mencken", &keys).is_none());
    }
}
