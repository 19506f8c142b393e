//! Agent routing: decides which persona answers each turn.

pub mod directives;
pub mod engine;
pub mod selector;
pub mod traits;

pub use directives::{DirectiveMatch, DirectiveMatcher, DirectiveMatching};
pub use engine::TransitionEngine;
pub use selector::{FixedSelector, RandomSelector};
pub use traits::{SpecialistSelector, Transition, TransitionCause};

use std::sync::Arc;

use crate::agents::{AgentRegistry, RegistryError};
use crate::config::SessionsConfig;

/// Create a specialist selector, seeded when `seed` is set.
pub fn create_selector(seed: Option<u64>) -> Box<dyn SpecialistSelector> {
    match seed {
        Some(seed) => Box::new(RandomSelector::seeded(seed)),
        None => Box::new(RandomSelector::from_entropy()),
    }
}

/// Create the transition engine described by the session settings.
pub fn create_engine(
    registry: Arc<AgentRegistry>,
    config: &SessionsConfig,
) -> Result<TransitionEngine, RegistryError> {
    let engine = TransitionEngine::new(
        registry,
        config.directive_matching,
        create_selector(config.selector_seed),
    )?;
    Ok(engine.with_auto_handoff(config.auto_handoff))
}
