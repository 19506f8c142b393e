#![warn(clippy::all, clippy::pedantic)]

//! SwarmChat session core.
//!
//! Holds live per-user conversations, issues session tokens, serializes each
//! user's turns, and moves the conversation between a moderator and its
//! specialist personas.

pub mod agents;
pub mod config;
pub mod persistence;
pub mod providers;
pub mod routing;
pub mod security;
pub mod sessions;

pub use config::Config;
pub use sessions::{SessionError, SessionManager};
