//! OpenAI-compatible `/chat/completions` generator.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::traits::Generator;
use crate::sessions::ChatMessage;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Generator speaking the OpenAI chat completions API. Any server with the
/// same wire format works through `api_url`.
pub struct OpenAiGenerator {
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) temperature: f64,
    client: Client,
}

impl OpenAiGenerator {
    pub fn new(
        base_url: Option<&str>,
        api_key: Option<&str>,
        temperature: f64,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.map(ToString::to_string),
            temperature,
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Full chat completions URL. A base URL that already names the endpoint
    /// is used as-is.
    fn chat_completions_url(&self) -> String {
        let has_full_endpoint = reqwest::Url::parse(&self.base_url)
            .map(|url| {
                url.path()
                    .trim_end_matches('/')
                    .ends_with("/chat/completions")
            })
            .unwrap_or_else(|_| self.base_url.ends_with("/chat/completions"));

        if has_full_endpoint {
            self.base_url.clone()
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }

    fn build_messages(instructions: &str, history: &[ChatMessage]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if !instructions.trim().is_empty() {
            messages.push(Message {
                role: "system".to_string(),
                content: instructions.to_string(),
            });
        }
        messages.extend(history.iter().map(|m| Message {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        }));
        messages
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(
        &self,
        model: &str,
        instructions: &str,
        history: &[ChatMessage],
    ) -> anyhow::Result<String> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "OpenAI API key not set. Set provider.api_key, OPENAI_API_KEY or SWARMCHAT_API_KEY."
            )
        })?;

        let request = ChatRequest {
            model: model.to_string(),
            messages: Self::build_messages(instructions, history),
            temperature: self.temperature,
            stream: Some(false),
        };

        let response = self
            .client
            .post(self.chat_completions_url())
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(super::api_error("OpenAI", response).await);
        }

        let chat_response: ApiChatResponse = response.json().await?;
        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("No response from OpenAI"))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_generator(url: Option<&str>, key: Option<&str>) -> OpenAiGenerator {
        OpenAiGenerator::new(url, key, 0.7, Duration::from_secs(5))
    }

    #[test]
    fn creates_with_defaults() {
        let g = make_generator(None, Some("test-key"));
        assert_eq!(g.base_url, DEFAULT_BASE_URL);
        assert_eq!(g.api_key.as_deref(), Some("test-key"));
        assert_eq!(g.name(), "openai");
    }

    #[test]
    fn strips_trailing_slash() {
        let g = make_generator(Some("https://example.com/v1/"), None);
        assert_eq!(g.base_url, "https://example.com/v1");
    }

    #[test]
    fn chat_completions_url_appends_path() {
        let g = make_generator(Some("https://example.com/v1"), None);
        assert_eq!(
            g.chat_completions_url(),
            "https://example.com/v1/chat/completions"
        );
    }

    #[test]
    fn chat_completions_url_keeps_full_endpoint() {
        let g = make_generator(Some("https://proxy.local/openai/chat/completions"), None);
        assert_eq!(
            g.chat_completions_url(),
            "https://proxy.local/openai/chat/completions"
        );
    }

    #[tokio::test]
    async fn generate_fails_without_key() {
        let g = make_generator(None, None);
        let result = g
            .generate("gpt-4o-mini", "be brief", &[ChatMessage::user("hi")])
            .await;
        assert!(result.unwrap_err().to_string().contains("API key not set"));
    }

    #[test]
    fn system_message_precedes_history() {
        let history = vec![ChatMessage::assistant("hello"), ChatMessage::user("hi")];
        let messages = OpenAiGenerator::build_messages("persona", &history);
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["system", "assistant", "user"]);
        assert_eq!(messages[0].content, "persona");
    }

    #[test]
    fn blank_instructions_are_omitted() {
        let messages = OpenAiGenerator::build_messages("  ", &[ChatMessage::user("hi")]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }

    #[test]
    fn request_serializes_correctly() {
        let req = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: OpenAiGenerator::build_messages("sys", &[ChatMessage::user("hello")]),
            temperature: 0.4,
            stream: Some(false),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("gpt-4o-mini"));
        assert!(json.contains("\"system\""));
        assert!(json.contains("\"stream\":false"));
    }

    #[test]
    fn response_deserializes() {
        let json = r#"{"choices":[{"message":{"content":"Hello there"}}]}"#;
        let resp: ApiChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.choices[0].message.content.as_deref(), Some("Hello there"));
    }

    #[test]
    fn response_empty_choices() {
        let resp: ApiChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(resp.choices.is_empty());
    }
}
