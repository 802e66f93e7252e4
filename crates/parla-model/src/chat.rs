//! HTTP chat-completions backend.
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint (including
//! local Ollama). Calls are blocking and bounded by the configured timeout;
//! a timed-out request surfaces as `ModelError::ChatFailed` so callers can
//! take their stage-local fallback path.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ChatConfig;
use crate::error::{ModelError, ModelResult};
use crate::{ChatMessage, ChatModel};

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

// ============================================================================
// HttpChatModel
// ============================================================================

/// Blocking HTTP chat-completions client.
#[derive(Debug)]
pub struct HttpChatModel {
    config: ChatConfig,
    client: reqwest::blocking::Client,
}

impl HttpChatModel {
    /// Create a new HTTP chat backend.
    pub fn new(config: &ChatConfig) -> ModelResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ModelError::chat_failed(&config.model, e.to_string()))?;

        Ok(Self {
            config: config.clone(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

impl ChatModel for HttpChatModel {
    fn complete(&self, messages: &[ChatMessage]) -> ModelResult<String> {
        let request = CompletionRequest {
            model: &self.config.model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: &m.role,
                    content: &m.content,
                })
                .collect(),
            temperature: self.config.temperature,
        };

        debug!(
            "Chat completion: {} messages to {}",
            messages.len(),
            self.endpoint()
        );

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .map_err(|e| ModelError::chat_failed(&self.config.model, e.to_string()))?;

        if !response.status().is_success() {
            return Err(ModelError::chat_failed(
                &self.config.model,
                format!("HTTP {}", response.status()),
            ));
        }

        let parsed: CompletionResponse = response
            .json()
            .map_err(|e| ModelError::chat_failed(&self.config.model, e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                ModelError::chat_failed(&self.config.model, "empty completion response")
            })?;

        Ok(content)
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}
