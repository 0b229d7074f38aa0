//! OpenAI-compatible chat completion client.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::AiError;
use crate::http::{create_http_client, truncate_body, DEFAULT_REQUEST_TIMEOUT};

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub const API_URL_ENV_VAR: &str = "ARM_AI_API_URL";
pub const MODEL_ENV_VAR: &str = "ARM_AI_MODEL";

const TEMPERATURE: f32 = 0.2;
const MAX_TOKENS: u32 = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// Sends a conversation and returns the assistant's reply text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AiError>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ReplyMessage>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

pub struct HttpCompletionClient {
    client: Client,
    api_url: String,
    model: String,
    api_key: SecretString,
}

impl HttpCompletionClient {
    pub fn new(api_url: String, model: String, api_key: SecretString) -> Result<Self, AiError> {
        Ok(Self {
            client: create_http_client(DEFAULT_REQUEST_TIMEOUT)?,
            api_url,
            model,
            api_key,
        })
    }

    /// Endpoint and model come from the config, then the environment, then defaults.
    pub fn from_config(config: &Config, api_key: SecretString) -> Result<Self, AiError> {
        let api_url = setting(config.ai_api_url.as_deref(), API_URL_ENV_VAR, DEFAULT_API_URL);
        let model = setting(config.ai_model.as_deref(), MODEL_ENV_VAR, DEFAULT_MODEL);
        Self::new(api_url, model, api_key)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn setting(configured: Option<&str>, env_var: &str, default: &str) -> String {
    configured
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .or_else(|| std::env::var(env_var).ok().filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| default.to_string())
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AiError> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        debug!(model = %self.model, messages = messages.len(), "Sending chat completion");

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Status {
                status,
                body: truncate_body(&body),
            });
        }

        let parsed: CompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(AiError::EmptyResponse)
    }
}
