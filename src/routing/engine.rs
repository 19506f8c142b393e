//! Agent transition engine: decides the active agent for each turn.

use std::sync::Arc;

use super::directives::{DirectiveMatcher, DirectiveMatching};
use super::traits::{SpecialistSelector, Transition, TransitionCause};
use crate::agents::{AgentKey, AgentRegistry, RegistryError};

/// Evaluates directives against the transfer graph, falling back to the
/// moderator's random handoff.
pub struct TransitionEngine {
    registry: Arc<AgentRegistry>,
    matcher: DirectiveMatcher,
    selector: Box<dyn SpecialistSelector>,
    auto_handoff: bool,
}

impl TransitionEngine {
    pub fn new(
        registry: Arc<AgentRegistry>,
        matching: DirectiveMatching,
        selector: Box<dyn SpecialistSelector>,
    ) -> Result<Self, RegistryError> {
        let matcher = DirectiveMatcher::new(&registry, matching)?;
        Ok(Self {
            registry,
            matcher,
            selector,
            auto_handoff: true,
        })
    }

    /// Enable or disable the moderator's random handoff.
    #[must_use]
    pub fn with_auto_handoff(mut self, enabled: bool) -> Self {
        self.auto_handoff = enabled;
        self
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn matching(&self) -> DirectiveMatching {
        self.matcher.mode()
    }

    /// The agent that answers `text`, given the agent that answered last.
    ///
    /// Only directives of agents reachable from `current` are candidates.
    /// Always yields a registered agent.
    pub fn next_agent(&self, current: AgentKey, first_message_sent: bool, text: &str) -> Transition {
        let reachable = self.registry.transfer_targets(current);
        if let Some(found) = self.matcher.find(text, reachable) {
            tracing::debug!(
                from = %self.registry.get(current).name,
                to = %self.registry.get(found.agent).name,
                directive = %found.token,
                "directive transfer"
            );
            return Transition {
                agent: found.agent,
                cause: TransitionCause::Directive,
            };
        }

        if current == self.registry.moderator_key() && first_message_sent && self.auto_handoff {
            let specialists = self.registry.specialist_keys();
            if !specialists.is_empty() {
                let index = self.selector.select(specialists.len()).min(specialists.len() - 1);
                let agent = specialists[index];
                tracing::debug!(
                    to = %self.registry.get(agent).name,
                    selector = self.selector.name(),
                    "random specialist handoff"
                );
                return Transition {
                    agent,
                    cause: TransitionCause::RandomHandoff,
                };
            }
        }

        Transition {
            agent: current,
            cause: TransitionCause::Unchanged,
        }
    }
}
