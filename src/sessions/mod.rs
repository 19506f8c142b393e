//! Session management: live per-user conversation state, tokens, and the
//! turn loop.

pub mod error;
pub mod manager;
pub mod policy;
pub mod state;
pub mod sweeper;
pub mod table;


pub use error::SessionError;
pub use manager::{
    SessionGuard, SessionHandle, SessionManager, SessionSettings, SessionStart, ACCESS_LOG_TARGET,
};
pub use policy::LogoutPolicy;
pub use state::{ChatMessage, ConversationState, Role};
pub use sweeper::spawn_idle_sweeper;
pub use table::SessionTable;

use std::sync::Arc;

use crate::config::Config;

/// Create a session manager from config, ready to share across tasks.
pub fn create_session_manager(config: &Config) -> anyhow::Result<Arc<SessionManager>> {
    Ok(Arc::new(SessionManager::from_config(config)?))
}
