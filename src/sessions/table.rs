//! Token and state maps.
//!
//! Each map has its own lock. No method holds both locks at once, and no
//! lock outlives the call.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::state::ConversationState;

/// A user's state behind its turn lock.
pub type SharedState = Arc<tokio::sync::Mutex<ConversationState>>;

struct TokenBinding {
    username: String,
    /// Epoch of the state the token was issued for.
    epoch: u64,
}

struct StateSlot {
    epoch: u64,
    state: SharedState,
}

/// token → username and username → state.
///
/// Every inserted state gets a fresh epoch. Tokens remember the epoch they
/// were issued under, so a cleanup aimed at an old state never revokes a
/// token issued for its replacement.
pub struct SessionTable {
    tokens: Mutex<HashMap<String, TokenBinding>>,
    states: Mutex<HashMap<String, StateSlot>>,
    next_epoch: AtomicU64,
}

impl SessionTable {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            states: Mutex::new(HashMap::new()),
            next_epoch: AtomicU64::new(1),
        }
    }

    /// Insert (or replace) the state for its username.
    pub fn insert_state(&self, state: ConversationState) -> (u64, SharedState) {
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let username = state.username.clone();
        let shared: SharedState = Arc::new(tokio::sync::Mutex::new(state));
        let mut states = self.states.lock();
        states.insert(
            username,
            StateSlot {
                epoch,
                state: shared.clone(),
            },
        );
        (epoch, shared)
    }

    /// Publish `token` for `username`. Returns `false` if the token is taken.
    pub fn bind_token(&self, token: &str, username: &str, epoch: u64) -> bool {
        let mut tokens = self.tokens.lock();
        if tokens.contains_key(token) {
            return false;
        }
        tokens.insert(
            token.to_string(),
            TokenBinding {
                username: username.to_string(),
                epoch,
            },
        );
        true
    }

    pub fn username_for(&self, token: &str) -> Option<String> {
        let tokens = self.tokens.lock();
        tokens.get(token).map(|b| b.username.clone())
    }

    pub fn state_for(&self, username: &str) -> Option<(u64, SharedState)> {
        let states = self.states.lock();
        states.get(username).map(|s| (s.epoch, s.state.clone()))
    }

    /// Token → username → state. `None` if either lookup misses.
    pub fn resolve(&self, token: &str) -> Option<(String, SharedState)> {
        let username = self.username_for(token)?;
        let (_, state) = self.state_for(&username)?;
        Some((username, state))
    }

    /// Remove one token, returning the username it was bound to.
    pub fn unbind_token(&self, token: &str) -> Option<String> {
        let mut tokens = self.tokens.lock();
        tokens.remove(token).map(|b| b.username)
    }

    /// Remove the user's tokens. With `up_to_epoch`, only tokens issued for
    /// that epoch or earlier go.
    pub fn unbind_user_tokens(&self, username: &str, up_to_epoch: Option<u64>) -> usize {
        let mut tokens = self.tokens.lock();
        let before = tokens.len();
        tokens.retain(|_, b| {
            b.username != username || up_to_epoch.is_some_and(|max| b.epoch > max)
        });
        before - tokens.len()
    }

    /// Remove the state only if it still has `epoch`.
    pub fn remove_state_if(&self, username: &str, epoch: u64) -> bool {
        let mut states = self.states.lock();
        match states.get(username) {
            Some(slot) if slot.epoch == epoch => {
                states.remove(username);
                true
            }
            _ => false,
        }
    }

    /// Snapshot of (username, epoch, state) for every live state.
    pub fn states(&self) -> Vec<(String, u64, SharedState)> {
        let states = self.states.lock();
        states
            .iter()
            .map(|(name, slot)| (name.clone(), slot.epoch, slot.state.clone()))
            .collect()
    }

    pub fn session_count(&self) -> usize {
        self.states.lock().len()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.lock().len()
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}
