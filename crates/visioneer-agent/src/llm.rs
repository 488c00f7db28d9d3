//! Language model collaborator for open-ended chat.
//!
//! Only general turns reach the model. It never decides intents or values
//! for catalog changes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use visioneer_core::config::LlmConfig;
use visioneer_core::types::{Role, Turn};

use crate::error::AgentError;

/// Instructions sent ahead of every general chat.
pub const SYSTEM_PROMPT: &str = "You are the shopping assistant for Visioneers Marketplace. \
You help buyers find products, compare options and complete purchases, and you help sellers \
keep their listings, prices and stock up to date.\n\n\
Keep track of the conversation: when the user refers to something mentioned earlier, use that \
context. Be friendly and concise. When you mention products, include price and availability \
if you know them. If you don't know something about a product, say so and suggest an \
alternative. Never claim to have changed a price, stock level or order yourself.";

/// One message in a chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn from_turn(turn: &Turn) -> Self {
        Self {
            role: turn.role.to_string(),
            content: turn.text.clone(),
        }
    }
}

/// System prompt followed by the last `window` turns of history.
pub fn build_messages(history: &[Turn], window: usize) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(window);
    std::iter::once(ChatMessage::system(SYSTEM_PROMPT))
        .chain(
            history[start..]
                .iter()
                .filter(|turn| turn.role != Role::System)
                .map(ChatMessage::from_turn),
        )
        .collect()
}

/// Free-form text generation.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AgentError>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl OpenAiChatClient {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, AgentError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(AgentError::LanguageModel("API key must not be empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AgentError::LanguageModel(format!("Failed to create HTTP client: {}", e)))?;

        let defaults = LlmConfig::default();
        Ok(Self {
            client,
            api_base: api_base.into(),
            api_key,
            model: model.into(),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
        })
    }

    /// Build a client from configuration, or `None` if chat is disabled or
    /// no key is available.
    pub fn from_config(config: &LlmConfig) -> Result<Option<Self>, AgentError> {
        if !config.enabled {
            return Ok(None);
        }
        let Some(api_key) = config.resolve_api_key() else {
            tracing::warn!("Language model enabled but no API key configured; using templates");
            return Ok(None);
        };
        Ok(Some(
            Self::new(&config.api_base, api_key, &config.model)?
                .with_sampling(config.temperature, config.max_tokens),
        ))
    }

    pub fn with_sampling(mut self, temperature: f64, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AgentError> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::LanguageModel(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::LanguageModel(format!(
                "status {}: {}",
                status, body
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| AgentError::LanguageModel(format!("invalid response: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| AgentError::LanguageModel("empty completion".to_string()))?;

        debug!(model = %self.model, chars = content.len(), "Completion received");
        Ok(content)
    }
}
