use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::CompletionConfig;
use crate::models::chat::Turn;

/// Why a completion attempt produced no usable text. Every variant is retryable.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("Failed to call completion API: {0}")]
    Transport(String),

    #[error("Completion API error: {status} - {body}")]
    Status { status: StatusCode, body: String },

    #[error("Failed to parse completion response: {0}")]
    Malformed(String),

    #[error("No choices returned from completion API")]
    EmptyChoices,

    #[error("Completion API returned an empty message")]
    EmptyContent,
}

/// Remote text generation: ordered turns in, generated text out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[Turn]) -> Result<String, CompletionError>;
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Turn],
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenRouter (OpenAI-compatible) chat completion client.
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    config: CompletionConfig,
}

impl OpenRouterClient {
    pub fn new(config: CompletionConfig) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| CompletionError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl CompletionClient for OpenRouterClient {
    async fn complete(&self, messages: &[Turn]) -> Result<String, CompletionError> {
        debug!("Requesting completion with {} messages", messages.len());

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status { status, body });
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;

        let choice = body.choices.into_iter().next().ok_or(CompletionError::EmptyChoices)?;

        let content = choice
            .message
            .and_then(|m| m.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(CompletionError::EmptyContent);
        }

        Ok(content)
    }
}
