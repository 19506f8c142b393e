//! Per-user conversation state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::AgentKey;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// A single history entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Live state of one user's conversation.
///
/// Mutated only by the holder of the user's turn lock. `messages` is
/// append-only.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub username: String,
    pub messages: Vec<ChatMessage>,
    pub active_agent: AgentKey,
    pub first_message_sent: bool,
    /// Digest of the user's messages from earlier sessions.
    pub recap: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(username: &str, moderator: AgentKey) -> Self {
        let now = Utc::now();
        Self {
            username: username.to_string(),
            messages: Vec::new(),
            active_agent: moderator,
            first_message_sent: false,
            recap: None,
            created_at: now,
            last_activity: now,
        }
    }

    /// Append the moderator's opening message. Returns `false` if a greeting
    /// was already recorded.
    pub fn record_greeting(&mut self, greeting: &str) -> bool {
        if self.first_message_sent {
            return false;
        }
        self.messages.push(ChatMessage::assistant(greeting));
        self.first_message_sent = true;
        true
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Count of messages with the given role.
    pub fn count(&self, role: Role) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }

    /// First assistant message, which is the greeting once one was sent.
    pub fn greeting(&self) -> Option<&str> {
        if !self.first_message_sent {
            return None;
        }
        self.messages
            .iter()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }
}

/// Build a recap from earlier user messages: joined by newlines, keeping at
/// most the last `max_chars` characters.
pub fn build_recap(history: &[ChatMessage], max_chars: usize) -> Option<String> {
    if max_chars == 0 {
        return None;
    }
    let joined = history
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if joined.is_empty() {
        return None;
    }

    let total = joined.chars().count();
    if total <= max_chars {
        return Some(joined);
    }
    Some(joined.chars().skip(total - max_chars).collect())
}
