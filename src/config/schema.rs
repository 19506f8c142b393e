use crate::agents::{AgentRole, DEFAULT_MODEL};
use crate::routing::DirectiveMatching;
use crate::sessions::LogoutPolicy;
use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

const CONFIG_FILE_NAME: &str = "config.toml";
const DEFAULT_DB_FILE_NAME: &str = "history.db";

// ── Top-level config ──────────────────────────────────────────────

/// Top-level SwarmChat configuration, loaded from `config.toml`.
///
/// Resolution order: `SWARMCHAT_CONFIG_DIR` env → `~/.swarmchat/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding `config.toml` - computed, not serialized
    #[serde(skip)]
    pub config_dir: PathBuf,
    /// Path to config.toml - computed, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Text-generation backend (`[provider]`).
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Persona catalog and prompt text (`[agents]`).
    #[serde(default)]
    pub agents: AgentsConfig,

    /// Session lifecycle and handoff behavior (`[sessions]`).
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// History/state storage (`[persistence]`).
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = default_config_dir().unwrap_or_else(|_| PathBuf::from(".swarmchat"));
        Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
            provider: ProviderConfig::default(),
            agents: AgentsConfig::default(),
            sessions: SessionsConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

// ── Provider ──────────────────────────────────────────────────────

/// Generation backend configuration (`[provider]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider ID. Default: `"openai"`.
    #[serde(default = "default_provider_name")]
    pub name: String,
    /// API key. Falls back to `OPENAI_API_KEY`, then `SWARMCHAT_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL override for any OpenAI-compatible endpoint.
    #[serde(default)]
    pub api_url: Option<String>,
    /// Sampling temperature (0.0–2.0). Default: `0.7`.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Request timeout in seconds. Default: `120`.
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider_name() -> String {
    "openai".into()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_provider_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            api_key: None,
            api_url: None,
            temperature: default_temperature(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

// ── Agents ────────────────────────────────────────────────────────

/// Persona catalog configuration (`[agents]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Model used by every built-in persona. Default: `"gpt-4o-mini"`.
    #[serde(default = "default_agent_model")]
    pub model: String,
    /// Moderator's opening message for a first-time user.
    #[serde(default = "default_greeting")]
    pub greeting: String,
    /// Opening message for a returning user; `{username}` is substituted.
    #[serde(default = "default_returning_greeting")]
    pub returning_greeting: String,
    /// Conversational note appended to every agent's instructions.
    #[serde(default = "default_style_guidance")]
    pub style_guidance: String,
    /// Replaces the built-in catalog when non-empty (`[[agents.personas]]`).
    #[serde(default)]
    pub personas: Vec<PersonaConfig>,
}

/// A configured persona (`[[agents.personas]]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    pub name: String,
    pub role: AgentRole,
    /// Overrides `agents.model` for this persona.
    #[serde(default)]
    pub model: Option<String>,
    /// Defaults to the standard "Answer as ..." persona prompt.
    #[serde(default)]
    pub instructions: Option<String>,
    pub directives: Vec<String>,
    /// Derived from the star topology when omitted.
    #[serde(default)]
    pub transfer_targets: Option<Vec<String>>,
}

fn default_agent_model() -> String {
    DEFAULT_MODEL.into()
}

fn default_greeting() -> String {
    "Hello, I'm the moderator. I'm here to help guide our conversation. \
     What's on your mind today?"
        .into()
}

fn default_returning_greeting() -> String {
    "Welcome back, {username}! Good to see you again. What would you like to talk about today?"
        .into()
}

fn default_style_guidance() -> String {
    "Your goals are to stimulate conversation, generate insight, and keep a light and \
     playful tone. Summarize previous conversations when useful. You sometimes ask \
     personal questions and make unsolicited suggestions and observations."
        .into()
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            model: default_agent_model(),
            greeting: default_greeting(),
            returning_greeting: default_returning_greeting(),
            style_guidance: default_style_guidance(),
            personas: Vec::new(),
        }
    }
}

// ── Sessions ──────────────────────────────────────────────────────

/// Session lifecycle configuration (`[sessions]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// What logout does to the in-memory conversation. Default: `retain`.
    #[serde(default)]
    pub logout_policy: LogoutPolicy,
    /// Directive recognition mode. Default: `substring`.
    #[serde(default)]
    pub directive_matching: DirectiveMatching,
    /// Moderator hands off to a random specialist when no directive fires. Default: `true`.
    #[serde(default = "default_true")]
    pub auto_handoff: bool,
    /// Fixed seed for specialist selection (reproducible runs).
    #[serde(default)]
    pub selector_seed: Option<u64>,
    /// Evict sessions idle for longer than this. Disabled when unset.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
    /// How often the idle sweeper runs. Default: `60`.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Maximum characters of earlier user messages carried into a new session. Default: `8000`.
    #[serde(default = "default_recap_max_chars")]
    pub recap_max_chars: usize,
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_recap_max_chars() -> usize {
    8000
}

impl SessionsConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            logout_policy: LogoutPolicy::default(),
            directive_matching: DirectiveMatching::default(),
            auto_handoff: true,
            selector_seed: None,
            idle_timeout_secs: None,
            sweep_interval_secs: default_sweep_interval_secs(),
            recap_max_chars: default_recap_max_chars(),
        }
    }
}

// ── Persistence ───────────────────────────────────────────────────

/// History/state storage configuration (`[persistence]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// `"sqlite"`, `"memory"` or `"none"`. Default: `"sqlite"`.
    #[serde(default = "default_persistence_backend")]
    pub backend: String,
    /// SQLite file; `~` is expanded. Defaults to `history.db` in the config directory.
    #[serde(default)]
    pub path: Option<String>,
    /// Maximum persisted messages loaded for a returning user. Default: `200`.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_persistence_backend() -> String {
    "sqlite".into()
}

fn default_history_limit() -> usize {
    200
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: default_persistence_backend(),
            path: None,
            history_limit: default_history_limit(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────

fn default_config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".swarmchat"))
}

fn resolve_config_dir() -> Result<PathBuf> {
    if let Ok(custom) = std::env::var("SWARMCHAT_CONFIG_DIR") {
        let custom = custom.trim();
        if !custom.is_empty() {
            return Ok(PathBuf::from(custom));
        }
    }
    default_config_dir()
}

impl Config {
    pub async fn load_or_init() -> Result<Self> {
        let config_dir = resolve_config_dir()?;
        let mut config = Self::load_or_init_in(&config_dir).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load `config.toml` from `config_dir`, writing defaults on first run.
    /// Env overrides are not applied here.
    pub async fn load_or_init_in(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        fs::create_dir_all(config_dir).await.with_context(|| {
            format!("Failed to create config directory: {}", config_dir.display())
        })?;

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_dir = config_dir.to_path_buf();
            config.config_path = config_path;
            config.validate()?;
            tracing::info!(
                path = %config.config_path.display(),
                initialized = false,
                "Config loaded"
            );
            Ok(config)
        } else {
            let config = Config {
                config_dir: config_dir.to_path_buf(),
                config_path,
                ..Config::default()
            };
            config.save().await?;

            // Restrict permissions on newly created config file (may contain API keys)
            #[cfg(unix)]
            {
                use std::{fs::Permissions, os::unix::fs::PermissionsExt};
                let _ = fs::set_permissions(&config.config_path, Permissions::from_mode(0o600))
                    .await;
            }

            tracing::info!(
                path = %config.config_path.display(),
                initialized = true,
                "Config loaded"
            );
            Ok(config)
        }
    }

    /// Validate configuration values that would cause runtime failures.
    pub fn validate(&self) -> Result<()> {
        if self.provider.name.trim().is_empty() {
            anyhow::bail!("provider.name must not be empty");
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            anyhow::bail!("provider.temperature must be between 0.0 and 2.0");
        }
        if self.provider.timeout_secs == 0 {
            anyhow::bail!("provider.timeout_secs must be greater than 0");
        }
        if self.agents.model.trim().is_empty() {
            anyhow::bail!("agents.model must not be empty");
        }
        if self.agents.greeting.trim().is_empty() {
            anyhow::bail!("agents.greeting must not be empty");
        }
        if self.sessions.idle_timeout_secs == Some(0) {
            anyhow::bail!("sessions.idle_timeout_secs must be greater than 0 when set");
        }
        if self.sessions.sweep_interval_secs == 0 {
            anyhow::bail!("sessions.sweep_interval_secs must be greater than 0");
        }
        match self.persistence.backend.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "memory" | "none" => {}
            other => anyhow::bail!(
                "Unknown persistence.backend '{other}'. Supported values: sqlite, memory, none"
            ),
        }
        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        if let Ok(provider) = std::env::var("SWARMCHAT_PROVIDER") {
            if !provider.trim().is_empty() {
                self.provider.name = provider.trim().to_string();
            }
        }

        if let Ok(key) = std::env::var("SWARMCHAT_API_KEY") {
            if !key.is_empty() {
                self.provider.api_key = Some(key);
            }
        }

        if let Ok(model) = std::env::var("SWARMCHAT_MODEL") {
            if !model.trim().is_empty() {
                self.agents.model = model.trim().to_string();
            }
        }

        if let Ok(policy) = std::env::var("SWARMCHAT_LOGOUT_POLICY") {
            match policy.parse::<LogoutPolicy>() {
                Ok(policy) => self.sessions.logout_policy = policy,
                Err(e) => tracing::warn!("Ignoring SWARMCHAT_LOGOUT_POLICY: {e}"),
            }
        }
    }

    /// Resolved SQLite path for the `sqlite` backend.
    pub fn database_path(&self) -> PathBuf {
        match self.persistence.path.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => PathBuf::from(shellexpand::tilde(raw).into_owned()),
            _ => self.config_dir.join(DEFAULT_DB_FILE_NAME),
        }
    }

    /// Write the config atomically (temp file + rename).
    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;

        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or(CONFIG_FILE_NAME);
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));

        let mut temp_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create temporary config file: {}",
                    temp_path.display()
                )
            })?;
        temp_file
            .write_all(toml_str.as_bytes())
            .await
            .context("Failed to write temporary config contents")?;
        temp_file
            .sync_all()
            .await
            .context("Failed to fsync temporary config file")?;
        drop(temp_file);

        if let Err(e) = fs::rename(&temp_path, &self.config_path).await {
            let _ = fs::remove_file(&temp_path).await;
            anyhow::bail!("Failed to atomically replace config file: {e}");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // ── Defaults ─────────────────────────────────────────────

    #[test]
    fn config_default_has_sane_values() {
        let c = Config::default();
        assert_eq!(c.provider.name, "openai");
        assert!((c.provider.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(c.agents.model, DEFAULT_MODEL);
        assert_eq!(c.sessions.logout_policy, LogoutPolicy::Retain);
        assert_eq!(c.sessions.directive_matching, DirectiveMatching::Substring);
        assert!(c.sessions.auto_handoff);
        assert!(c.sessions.idle_timeout().is_none());
        assert_eq!(c.persistence.backend, "sqlite");
        assert!(c.config_path.to_string_lossy().contains("config.toml"));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let raw = r#"
[sessions]
logout_policy = "evict"
directive_matching = "delimited"
idle_timeout_secs = 900

[[agents.personas]]
name = "Host"
role = "moderator"
directives = ["/host"]

[[agents.personas]]
name = "Poe"
role = "specialist"
directives = ["/poe"]
"#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.sessions.logout_policy, LogoutPolicy::Evict);
        assert_eq!(config.sessions.directive_matching, DirectiveMatching::Delimited);
        assert_eq!(config.sessions.idle_timeout(), Some(Duration::from_secs(900)));
        assert_eq!(config.sessions.recap_max_chars, 8000);
        assert_eq!(config.agents.personas.len(), 2);
        assert_eq!(config.agents.personas[0].role, AgentRole::Moderator);
        assert!(config.agents.personas[1].transfer_targets.is_none());
        assert_eq!(config.provider.name, "openai");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut c = Config::default();
        c.provider.temperature = 3.5;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.persistence.backend = "postgres".into();
        let err = c.validate().unwrap_err().to_string();
        assert!(err.contains("Unknown persistence.backend"));

        let mut c = Config::default();
        c.sessions.idle_timeout_secs = Some(0);
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.agents.greeting = "   ".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn database_path_defaults_into_config_dir() {
        let mut c = Config::default();
        c.config_dir = PathBuf::from("/tmp/swarmchat-test");
        assert_eq!(
            c.database_path(),
            PathBuf::from("/tmp/swarmchat-test/history.db")
        );

        c.persistence.path = Some("/var/lib/swarmchat/chat.db".into());
        assert_eq!(c.database_path(), PathBuf::from("/var/lib/swarmchat/chat.db"));
    }

    #[tokio::test]
    async fn load_or_init_writes_then_reads_config() {
        let tmp = TempDir::new().unwrap();

        let first = Config::load_or_init_in(tmp.path()).await.unwrap();
        assert!(first.config_path.exists());
        assert_eq!(first.config_dir, tmp.path());

        let mut edited = first.clone();
        edited.sessions.logout_policy = LogoutPolicy::Evict;
        edited.provider.temperature = 0.2;
        edited.save().await.unwrap();

        let second = Config::load_or_init_in(tmp.path()).await.unwrap();
        assert_eq!(second.sessions.logout_policy, LogoutPolicy::Evict);
        assert!((second.provider.temperature - 0.2).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn load_rejects_malformed_file() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "[sessions\nbroken")
            .await
            .unwrap();
        let err = Config::load_or_init_in(tmp.path()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[tokio::test]
    async fn save_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load_or_init_in(tmp.path()).await.unwrap();
        config.save().await.unwrap();

        let mut entries = tokio::fs::read_dir(tmp.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, ["config.toml"]);
    }
}
