//! Generation providers.
//!
//! Each backend implements [`Generator`] and is registered in
//! [`create_generator`] under its canonical config name.

pub mod openai;
pub mod traits;

pub use openai::OpenAiGenerator;
pub use traits::Generator;

use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::config::ProviderConfig;

const MAX_API_ERROR_CHARS: usize = 200;
const REDACTED: &str = "[REDACTED]";

/// Key prefixes that mark a credential in upstream error text.
const SECRET_PREFIXES: [&str; 7] = ["sk-", "xoxb-", "xoxp-", "ghp_", "gho_", "ghu_", "github_pat_"];

fn secret_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let prefixes: Vec<String> = SECRET_PREFIXES.iter().map(|p| regex::escape(p)).collect();
        let source = format!(r"(?:{})[A-Za-z0-9_.:-]+", prefixes.join("|"));
        Regex::new(&source).expect("secret prefixes form a valid pattern")
    })
}

/// Replace credential-looking tokens (`sk-...`, Slack and GitHub tokens)
/// with `[REDACTED]`. A bare prefix is left alone.
pub fn scrub_secret_patterns(input: &str) -> String {
    secret_pattern().replace_all(input, REDACTED).into_owned()
}

/// Scrub secrets, then cap the text at `MAX_API_ERROR_CHARS` characters.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);
    match scrubbed.char_indices().nth(MAX_API_ERROR_CHARS) {
        Some((cut, _)) => format!("{}...", &scrubbed[..cut]),
        None => scrubbed,
    }
}

/// Build a sanitized provider error from a failed HTTP response.
pub async fn api_error(provider: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
    let sanitized = sanitize_api_error(&body);
    anyhow::anyhow!("{provider} API error ({status}): {sanitized}")
}

/// Resolve the API key: explicit config value, then the provider's own env
/// var, then `SWARMCHAT_API_KEY`.
fn resolve_provider_credential(name: &str, credential_override: Option<&str>) -> Option<String> {
    if let Some(raw_override) = credential_override {
        let trimmed_override = raw_override.trim();
        if !trimmed_override.is_empty() {
            return Some(trimmed_override.to_owned());
        }
    }

    let provider_env_candidates: &[&str] = match name {
        "openai" => &["OPENAI_API_KEY"],
        _ => &[],
    };

    for env_var in provider_env_candidates.iter().chain(["SWARMCHAT_API_KEY"].iter()) {
        if let Ok(value) = std::env::var(env_var) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    None
}

/// Factory: create the generator named by `config.name`.
pub fn create_generator(config: &ProviderConfig) -> anyhow::Result<Arc<dyn Generator>> {
    let name = config.name.trim();
    let key = resolve_provider_credential(name, config.api_key.as_deref());
    let timeout = Duration::from_secs(config.timeout_secs.max(1));

    match name {
        "openai" => {
            if key.is_none() {
                tracing::warn!("no OpenAI API key configured; generation calls will fail");
            }
            Ok(Arc::new(OpenAiGenerator::new(
                config.api_url.as_deref(),
                key.as_deref(),
                config.temperature,
                timeout,
            )))
        }
        _ => anyhow::bail!("Unknown provider: {name}. Only \"openai\" is currently supported."),
    }
}

/// Information about a supported provider for display purposes.
pub struct ProviderInfo {
    /// Canonical name used in config (e.g. `"openai"`)
    pub name: &'static str,
    /// Human-readable display name
    pub display_name: &'static str,
}

/// All known providers, for `swarmchat status`.
pub fn list_providers() -> Vec<ProviderInfo> {
    vec![ProviderInfo {
        name: "openai",
        display_name: "OpenAI",
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(name: &str) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            api_key: Some("provider-test-credential".to_string()),
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn factory_openai() {
        let generator = create_generator(&provider("openai")).unwrap();
        assert_eq!(generator.name(), "openai");
    }

    #[test]
    fn factory_unknown_provider_errors() {
        let err = create_generator(&provider("nonexistent")).err().unwrap();
        assert!(err.to_string().contains("Unknown provider"));
    }

    #[test]
    fn factory_empty_name_errors() {
        assert!(create_generator(&provider("")).is_err());
    }

    #[test]
    fn listed_providers_are_constructible() {
        for info in list_providers() {
            assert!(
                create_generator(&provider(info.name)).is_ok(),
                "Listed provider should be constructible: {}",
                info.name
            );
        }
    }

    // ── API error sanitization ───────────────────────────────

    #[test]
    fn generation_error_hides_openai_key() {
        let out = sanitize_api_error("OpenAI API error (401): Incorrect API key: sk-proj-Ab12.x9");
        assert_eq!(out, "OpenAI API error (401): Incorrect API key: [REDACTED]");
    }

    #[test]
    fn bare_prefix_is_not_redacted() {
        assert_eq!(scrub_secret_patterns("use an sk- key"), "use an sk- key");
    }

    #[test]
    fn long_upstream_body_is_capped_on_a_char_boundary() {
        let body = "é".repeat(300);
        let out = sanitize_api_error(&body);
        assert_eq!(out.chars().count(), MAX_API_ERROR_CHARS + 3);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn resolve_provider_credential_prefers_explicit_argument() {
        let resolved = resolve_provider_credential("openai", Some("  explicit-key  "));
        assert_eq!(resolved, Some("explicit-key".to_string()));
    }
}
