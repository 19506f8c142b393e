//! Security helpers: session tokens and log redaction.

pub mod tokens;

pub use tokens::generate_token;

/// Redact sensitive values for safe logging. Shows first 4 chars + "***" suffix.
pub fn redact(value: &str) -> String {
    match value.char_indices().nth(4) {
        Some((idx, _)) => format!("{}***", &value[..idx]),
        None => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_hides_most_of_value() {
        assert_eq!(redact("abcdefgh"), "abcd***");
        assert_eq!(redact("ab"), "***");
        assert_eq!(redact(""), "***");
        assert_eq!(redact("12345"), "1234***");
        assert_eq!(redact("abcd"), "***");
    }

    #[test]
    fn redact_respects_char_boundaries() {
        assert_eq!(redact("ééééé"), "éééé***");
    }

    #[test]
    fn redacted_token_keeps_only_prefix() {
        let token = generate_token();
        let redacted = redact(&token);
        assert_eq!(redacted.len(), 7);
        assert!(token.starts_with(&redacted[..4]));
    }
}
