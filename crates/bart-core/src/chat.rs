//! Chat gateway: Mistral chat completions with a single fallback retry.
//!
//! The message list is always `[persona] + [last 10 history turns] + [current
//! user text]`. A client-error (4xx) answer from the primary model is retried
//! exactly once against the fallback model with an identical message list; no
//! other failure class is retried, and there is never a third attempt.
//!
//! API key: `MISTRAL_API_KEY`. `MISTRAL_API_URL` overrides the endpoint
//! (tests point this at a local stub).

use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

const MISTRAL_API_BASE: &str = "https://api.mistral.ai/v1";
const PRIMARY_MODEL: &str = "mistral-small-latest";
const FALLBACK_MODEL: &str = "open-mistral-7b";

/// Only the most recent history is forwarded; anything older is silently
/// dropped to bound payload size.
const HISTORY_WINDOW: usize = 10;

const MAX_TOKENS: u32 = 1000;
const TEMPERATURE: f32 = 0.7;
const TOP_P: f32 = 0.9;

/// Persona sent as the system message on every request.
const SYSTEM_PROMPT: &str = "You are Bart, a helpful and conversational AI assistant. \
    You provide thoughtful, engaging responses and can help users with various topics. \
    Keep your responses natural, informative, and friendly. You can have deep \
    conversations while being concise when appropriate.";

/// Returned when the provider answers well-formed but without reply content.
const EMPTY_REPLY_FALLBACK: &str = "I'm sorry, I couldn't generate a response.";

/// One prior exchange entry, as the UI reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryTurn {
    #[serde(rename = "isUser")]
    pub is_user: bool,
    pub content: String,
}

// OpenAI-compatible wire shapes (Mistral speaks the same dialect).
#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Gateway seam for chat completion. Implemented by [`MistralChat`] in
/// production and by fakes in controller tests.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Complete `message` against the prior `history`.
    async fn complete(&self, message: &str, history: &[HistoryTurn]) -> GatewayResult<String>;
}

/// Production chat backend against the Mistral completion API.
#[derive(Debug, Clone)]
pub struct MistralChat {
    api_key: String,
    base_url: String,
    primary_model: String,
    fallback_model: String,
    client: reqwest::Client,
}

impl MistralChat {
    /// Build from environment; fails with `Config` when the key is absent,
    /// without issuing any HTTP call.
    pub fn from_env() -> GatewayResult<Self> {
        let api_key = std::env::var("MISTRAL_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| GatewayError::Config("Mistral API key not configured".to_string()))?;
        let base_url =
            std::env::var("MISTRAL_API_URL").unwrap_or_else(|_| MISTRAL_API_BASE.to_string());
        Self::new(api_key, base_url)
    }

    /// Create with explicit config (tests and non-env wiring).
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            primary_model: PRIMARY_MODEL.to_string(),
            fallback_model: FALLBACK_MODEL.to_string(),
            client,
        })
    }

    fn build_messages(&self, message: &str, history: &[HistoryTurn]) -> Vec<ChatMessage> {
        let skip = history.len().saturating_sub(HISTORY_WINDOW);
        let mut messages = Vec::with_capacity(history.len().min(HISTORY_WINDOW) + 2);
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: SYSTEM_PROMPT.to_string(),
        });
        for turn in &history[skip..] {
            messages.push(ChatMessage {
                role: if turn.is_user { "user" } else { "assistant" }.to_string(),
                content: turn.content.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: message.to_string(),
        });
        messages
    }

    async fn request_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> GatewayResult<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = ChatCompletionRequest {
            model,
            messages,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            top_p: TOP_P,
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        Ok(res)
    }
}

#[async_trait]
impl ChatBackend for MistralChat {
    async fn complete(&self, message: &str, history: &[HistoryTurn]) -> GatewayResult<String> {
        if message.trim().is_empty() {
            return Err(GatewayError::Validation("Message is required".to_string()));
        }

        let messages = self.build_messages(message, history);
        let res = self.request_completion(&self.primary_model, &messages).await?;

        let res = if res.status().is_client_error() {
            let primary_status = res.status().as_u16();
            let detail = res.text().await.unwrap_or_default();
            warn!(
                status = primary_status,
                "primary chat model rejected request, retrying with fallback"
            );
            let fallback = self.request_completion(&self.fallback_model, &messages).await?;
            if !fallback.status().is_success() {
                // The fallback was the one retry allowed; report the primary failure.
                return Err(GatewayError::Upstream {
                    status: primary_status,
                    detail,
                });
            }
            fallback
        } else if !res.status().is_success() {
            let status = res.status().as_u16();
            let detail = res.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream { status, detail });
        } else {
            res
        };

        let parsed: ChatCompletionResponse = res.json().await?;
        let reply = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| EMPTY_REPLY_FALLBACK.to_string());
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_of(n: usize) -> Vec<HistoryTurn> {
        (0..n)
            .map(|i| HistoryTurn {
                is_user: i % 2 == 0,
                content: format!("turn {i}"),
            })
            .collect()
    }

    #[test]
    fn message_list_starts_with_persona_and_ends_with_user_text() {
        let chat = MistralChat::new("key", "http://localhost").unwrap();
        let messages = chat.build_messages("hello", &history_of(2));

        assert_eq!(messages.first().unwrap().role, "system");
        assert_eq!(messages.last().unwrap().role, "user");
        assert_eq!(messages.last().unwrap().content, "hello");
        assert_eq!(messages.len(), 4);
    }

    #[test]
    fn history_beyond_the_window_is_dropped() {
        let chat = MistralChat::new("key", "http://localhost").unwrap();
        let messages = chat.build_messages("current", &history_of(15));

        // system + 10 retained history turns + current message
        assert_eq!(messages.len(), 12);
        // The oldest retained entry is history index 5.
        assert_eq!(messages[1].content, "turn 5");
    }

    #[test]
    fn history_roles_follow_the_author_flag() {
        let chat = MistralChat::new("key", "http://localhost").unwrap();
        let history = vec![
            HistoryTurn { is_user: false, content: "welcome".into() },
            HistoryTurn { is_user: true, content: "hi".into() },
        ];
        let messages = chat.build_messages("next", &history);
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[2].role, "user");
    }

    #[tokio::test]
    async fn empty_message_is_rejected_without_a_call() {
        // An unroutable base URL proves no request is attempted.
        let chat = MistralChat::new("key", "http://127.0.0.1:1").unwrap();
        let err = chat.complete("   ", &[]).await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }
}
