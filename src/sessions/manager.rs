//! Session manager: token issuance, per-user locking and turn processing.
//!
//! Lock discipline:
//! - the token map and the state map are each locked only for a lookup or
//!   an insert, never both at once and never across an `.await`;
//! - a user's turn lock (`tokio::sync::Mutex`, FIFO) is held for the whole
//!   turn, including the generation call, and only blocks that same user;
//! - history is mutated only after the generation future resolves, so a
//!   cancelled turn leaves no trace.

use chrono::Utc;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

use super::error::SessionError;
use super::policy::LogoutPolicy;
use super::state::{build_recap, ChatMessage, ConversationState};
use super::table::{SessionTable, SharedState};
use crate::agents::{create_registry, AgentRegistry};
use crate::config::Config;
use crate::persistence::{create_persistence, PersistedState, Persistence};
use crate::providers::{create_generator, sanitize_api_error, Generator};
use crate::routing::{create_engine, TransitionEngine};
use crate::security::{generate_token, redact};

/// Log target for prompt/response access events.
pub const ACCESS_LOG_TARGET: &str = "swarmchat::access";

/// Returned by `create_session` and `resume_or_create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStart {
    pub token: String,
    /// The moderator's opening message for this state.
    pub greeting: String,
    /// An existing in-memory state was reused.
    pub resumed: bool,
    /// The user had prior history or state.
    pub returning: bool,
}

/// Text and limits applied to every session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub greeting: String,
    /// Greeting for returning users. `{username}` is substituted.
    pub returning_greeting: String,
    /// Appended to every agent's instructions.
    pub style_guidance: String,
    pub logout_policy: LogoutPolicy,
    pub recap_max_chars: usize,
    /// How many persisted messages to read when building a recap.
    pub history_limit: usize,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            greeting: config.agents.greeting.clone(),
            returning_greeting: config.agents.returning_greeting.clone(),
            style_guidance: config.agents.style_guidance.clone(),
            logout_policy: config.sessions.logout_policy,
            recap_max_chars: config.sessions.recap_max_chars,
            history_limit: config.persistence.history_limit,
        }
    }

    fn greeting_for(&self, username: &str, returning: bool) -> String {
        if returning && !self.returning_greeting.trim().is_empty() {
            self.returning_greeting.replace("{username}", username)
        } else {
            self.greeting.clone()
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A resolved, not yet locked, session.
pub struct SessionHandle {
    pub username: String,
    state: SharedState,
}

impl SessionHandle {
    /// Wait for the user's turn lock.
    pub async fn lock(self) -> SessionGuard {
        SessionGuard {
            guard: self.state.lock_owned().await,
        }
    }
}

/// Exclusive access to a user's state. Dropping it releases the turn lock.
pub struct SessionGuard {
    guard: OwnedMutexGuard<ConversationState>,
}

impl Deref for SessionGuard {
    type Target = ConversationState;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

pub struct SessionManager {
    table: SessionTable,
    engine: TransitionEngine,
    generator: Arc<dyn Generator>,
    persistence: Arc<dyn Persistence>,
    settings: SessionSettings,
}

impl SessionManager {
    pub fn new(
        engine: TransitionEngine,
        generator: Arc<dyn Generator>,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        Self {
            table: SessionTable::new(),
            engine,
            generator,
            persistence,
            settings: SessionSettings::default(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the registry, engine, generator and persistence from config.
    ///
    /// Registry errors surface here, at startup.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let registry = Arc::new(create_registry(&config.agents).map_err(SessionError::from)?);
        let engine = create_engine(registry, &config.sessions).map_err(SessionError::from)?;
        let generator = create_generator(&config.provider)?;
        let persistence = create_persistence(&config.persistence, &config.database_path())?;

        tracing::info!(
            agents = engine.registry().len(),
            generator = generator.name(),
            persistence = persistence.name(),
            logout_policy = %config.sessions.logout_policy,
            "session manager ready"
        );

        Ok(Self::new(engine, generator, persistence)
            .with_settings(SessionSettings::from_config(config)))
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        self.engine.registry()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    pub fn session_count(&self) -> usize {
        self.table.session_count()
    }

    pub fn token_count(&self) -> usize {
        self.table.token_count()
    }

    /// Start a fresh conversation for `username`, replacing any state it
    /// already has. The state is complete (greeting included) and published
    /// before the token is, so the token always resolves.
    pub async fn create_session(&self, username: &str) -> SessionStart {
        let (history, prior_state) = self.load_prior(username).await;
        let returning = !history.is_empty() || prior_state.is_some();
        let greeting = self.settings.greeting_for(username, returning);

        let mut state = ConversationState::new(username, self.registry().moderator_key());
        state.recap = build_recap(&history, self.settings.recap_max_chars);
        state.record_greeting(&greeting);

        let (epoch, _) = self.table.insert_state(state);
        let token = self.issue_token(username, epoch);

        tracing::info!(
            user = %username,
            token = %redact(&token),
            returning,
            "session created"
        );
        self.persist_turn(username, None, Some(&greeting)).await;

        SessionStart {
            token,
            greeting,
            resumed: false,
            returning,
        }
    }

    /// Issue a new token for the user's live state if there is one,
    /// otherwise create a session.
    pub async fn resume_or_create(&self, username: &str) -> SessionStart {
        let Some((epoch, state)) = self.table.state_for(username) else {
            return self.create_session(username).await;
        };

        let greeting = {
            let state = state.lock().await;
            state.greeting().unwrap_or_default().to_string()
        };
        let token = self.issue_token(username, epoch);
        tracing::info!(user = %username, token = %redact(&token), "session resumed");

        SessionStart {
            token,
            greeting,
            resumed: true,
            returning: true,
        }
    }

    /// Token → username → state, without locking.
    pub fn resolve_session(&self, token: &str) -> Result<SessionHandle, SessionError> {
        let (username, state) = self
            .table
            .resolve(token)
            .ok_or(SessionError::InvalidSession)?;
        Ok(SessionHandle { username, state })
    }

    /// Resolve `token` and wait for the user's turn lock.
    pub async fn lock_session(&self, token: &str) -> Result<SessionGuard, SessionError> {
        let handle = self.resolve_session(token)?;
        Ok(handle.lock().await)
    }

    /// Run `f` with exclusive access to the session's state.
    pub async fn with_session<F, R>(&self, token: &str, f: F) -> Result<R, SessionError>
    where
        F: FnOnce(&mut ConversationState) -> R,
    {
        let mut guard = self.lock_session(token).await?;
        Ok(f(&mut guard))
    }

    /// Process one user message and return the assistant's reply.
    ///
    /// The agent transition applies even when generation fails. On failure
    /// the user message is kept and no assistant message is added.
    pub async fn process_turn(&self, token: &str, text: &str) -> Result<String, SessionError> {
        let handle = self.resolve_session(token)?;
        let state = handle.state.clone();
        let mut guard = handle.lock().await;
        let registry = self.registry().clone();

        let transition = self
            .engine
            .next_agent(guard.active_agent, guard.first_message_sent, text);
        let agent = registry.get(transition.agent);
        let instructions =
            self.compose_instructions(&agent.instructions, guard.recap.as_deref(), &guard.username);

        let mut history = Vec::with_capacity(guard.messages.len() + 1);
        history.extend_from_slice(&guard.messages);
        history.push(ChatMessage::user(text));

        tracing::info!(
            target: ACCESS_LOG_TARGET,
            user = %guard.username,
            agent = %agent.name,
            cause = ?transition.cause,
            prompt = %text,
            "prompt"
        );

        let result = self
            .generator
            .generate(&agent.model, &instructions, &history)
            .await;

        guard.active_agent = transition.agent;
        guard.messages.push(ChatMessage::user(text));
        guard.touch();
        let username = guard.username.clone();

        match result {
            Ok(reply) => {
                guard.messages.push(ChatMessage::assistant(reply.clone()));
                tracing::info!(
                    target: ACCESS_LOG_TARGET,
                    user = %username,
                    agent = %agent.name,
                    response = %reply,
                    "response"
                );
                self.persist_turn(&username, Some(text), Some(&reply)).await;
                // An evicted or replaced state must not write its agent back.
                if self.is_live(&username, &state) {
                    self.persist_state(&username, &agent.name).await;
                }
                Ok(reply)
            }
            Err(e) => {
                let message = sanitize_api_error(&format!("{e:#}"));
                tracing::warn!(
                    user = %username,
                    agent = %agent.name,
                    generator = self.generator.name(),
                    error = %message,
                    "generation failed"
                );
                self.persist_turn(&username, Some(text), None).await;
                Err(SessionError::GenerationFailed(message))
            }
        }
    }

    /// Snapshot of the session's messages.
    pub async fn history(&self, token: &str) -> Result<Vec<ChatMessage>, SessionError> {
        self.with_session(token, |state| state.messages.clone()).await
    }

    /// Name of the agent that will be consulted first on the next turn.
    pub async fn active_agent(&self, token: &str) -> Result<String, SessionError> {
        let key = self.with_session(token, |state| state.active_agent).await?;
        Ok(self.registry().get(key).name.clone())
    }

    /// Log out. What else goes follows the configured logout policy.
    pub async fn invalidate(&self, token: &str) -> Result<(), SessionError> {
        let username = self
            .table
            .unbind_token(token)
            .ok_or(SessionError::InvalidSession)?;

        match self.settings.logout_policy {
            LogoutPolicy::Retain => {
                tracing::info!(
                    user = %username,
                    token = %redact(token),
                    policy = "retain",
                    "session logged out"
                );
            }
            LogoutPolicy::Evict => {
                // Holding the turn lock lets an in-flight turn finish its
                // writes before the state is cleared.
                let current = self.table.state_for(&username);
                let _turn = match &current {
                    Some((_, state)) => Some(state.clone().lock_owned().await),
                    None => None,
                };
                let revoked = match current {
                    Some((epoch, _)) => {
                        self.table.remove_state_if(&username, epoch);
                        self.table.unbind_user_tokens(&username, Some(epoch))
                    }
                    None => 0,
                };
                if let Err(e) = self.persistence.clear_state(&username).await {
                    tracing::warn!(user = %username, error = %e, "failed to clear chat state");
                }
                tracing::info!(
                    user = %username,
                    token = %redact(token),
                    revoked_tokens = revoked,
                    policy = "evict",
                    "session logged out"
                );
            }
        }
        Ok(())
    }

    /// Drop states idle for at least `max_idle`, with their tokens.
    ///
    /// States whose turn lock is held are skipped, and so are states
    /// replaced since the scan started. Returns the evicted usernames.
    pub fn evict_idle(&self, max_idle: Duration) -> Vec<String> {
        let now = Utc::now();
        let mut evicted = Vec::new();

        for (username, epoch, state) in self.table.states() {
            let Ok(guard) = state.try_lock() else {
                continue;
            };
            let idle = (now - guard.last_activity).to_std().unwrap_or_default();
            if idle < max_idle {
                continue;
            }
            if self.table.remove_state_if(&username, epoch) {
                let revoked = self.table.unbind_user_tokens(&username, Some(epoch));
                tracing::debug!(
                    user = %username,
                    idle_secs = idle.as_secs(),
                    revoked_tokens = revoked,
                    "evicted idle session"
                );
                evicted.push(username);
            }
        }

        evicted
    }

    /// Whether `state` is still the one the table holds for `username`.
    fn is_live(&self, username: &str, state: &SharedState) -> bool {
        self.table
            .state_for(username)
            .is_some_and(|(_, live)| Arc::ptr_eq(&live, state))
    }

    fn issue_token(&self, username: &str, epoch: u64) -> String {
        loop {
            let token = generate_token();
            if self.table.bind_token(&token, username, epoch) {
                return token;
            }
        }
    }

    fn compose_instructions(&self, base: &str, recap: Option<&str>, username: &str) -> String {
        let mut instructions = base.to_string();
        let style = self.settings.style_guidance.trim();
        if !style.is_empty() {
            instructions.push_str("\n\n");
            instructions.push_str(style);
        }
        if let Some(recap) = recap {
            instructions.push_str(&format!(
                "\n\nIn earlier conversations {username} wrote:\n{recap}"
            ));
        }
        instructions
    }

    async fn load_prior(&self, username: &str) -> (Vec<ChatMessage>, Option<PersistedState>) {
        let history = match self
            .persistence
            .load_history(username, self.settings.history_limit)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(user = %username, error = %e, "failed to load history");
                Vec::new()
            }
        };
        let state = match self.persistence.load_state(username).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(user = %username, error = %e, "failed to load chat state");
                None
            }
        };
        (history, state)
    }

    async fn persist_turn(&self, username: &str, user_text: Option<&str>, reply: Option<&str>) {
        if let Err(e) = self.persistence.append_turn(username, user_text, reply).await {
            tracing::warn!(
                user = %username,
                backend = self.persistence.name(),
                error = %e,
                "failed to persist turn"
            );
        }
    }

    async fn persist_state(&self, username: &str, agent_name: &str) {
        let state = PersistedState {
            active_agent: agent_name.to_string(),
            last_interaction: Utc::now(),
        };
        if let Err(e) = self.persistence.save_state(username, &state).await {
            tracing::warn!(
                user = %username,
                backend = self.persistence.name(),
                error = %e,
                "failed to save chat state"
            );
        }
    }
}
