use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What `invalidate` (logout) does to the user's in-memory state.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogoutPolicy {
    /// Drop only the presented token. The state stays resumable.
    #[default]
    Retain,
    /// Drop every token for the user, the state, and the persisted state.
    Evict,
}

impl fmt::Display for LogoutPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retain => f.write_str("retain"),
            Self::Evict => f.write_str("evict"),
        }
    }
}

impl FromStr for LogoutPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retain" => Ok(Self::Retain),
            "evict" => Ok(Self::Evict),
            other => Err(format!(
                "unknown logout policy '{other}' (expected 'retain' or 'evict')"
            )),
        }
    }
}
