//! OpenAI-compatible chat client
//!
//! Backs the domain classifier and the quality judges. Any endpoint speaking
//! the `/chat/completions` protocol works (Gemini's OpenAI shim, OpenRouter,
//! a local vLLM server).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use tracing::debug;

use crate::config::JudgeConfig;
use crate::error::{Error, Result};

use super::types::{ChatRequest, ChatResponse, Message};

/// Anything that turns a prompt into generated text
///
/// The oracles are written against this trait so tests can substitute
/// canned responses for a live endpoint.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Chat completions client
#[derive(Clone)]
pub struct LlmClient {
    http_client: HttpClient,
    api_key: Option<String>,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Builder for creating an LlmClient
#[derive(Default)]
pub struct LlmClientBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
    timeout_secs: Option<u64>,
}

impl LlmClientBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed every field from the judge section of the configuration
    pub fn config(mut self, config: &JudgeConfig) -> Self {
        self.base_url = Some(config.base_url.clone());
        self.model = Some(config.model.clone());
        self.temperature = Some(config.temperature);
        self.max_tokens = Some(config.max_tokens);
        self.timeout_secs = Some(config.timeout_secs);
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the request timeout
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Build the LlmClient
    pub fn build(self) -> Result<LlmClient> {
        let defaults = JudgeConfig::default();

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(
                self.timeout_secs.unwrap_or(defaults.timeout_secs),
            ))
            .build()
            .map_err(Error::NetworkError)?;

        Ok(LlmClient {
            http_client,
            api_key: self.api_key,
            base_url: self
                .base_url
                .unwrap_or(defaults.base_url)
                .trim_end_matches('/')
                .to_string(),
            model: self.model.unwrap_or(defaults.model),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
        })
    }
}

impl LlmClient {
    /// Create a new builder for LlmClient
    pub fn builder() -> LlmClientBuilder {
        LlmClientBuilder::new()
    }

    /// Build a client for the judge endpoint, reading the key from the environment
    pub fn from_config(config: &JudgeConfig) -> Result<Self> {
        let api_key = config
            .resolved_api_key()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        let mut builder = LlmClientBuilder::new().config(config);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        builder.build()
    }

    /// Model requests are sent to
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a chat completion and return the first choice's content
    pub async fn complete(&self, messages: Vec<Message>) -> Result<String> {
        let request = ChatRequest::new(&self.model, messages)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %request.model, messages = request.messages.len(), "Sending chat completion request");

        let mut http = self.http_client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.map_err(Error::NetworkError)?;
        let status = response.status();
        if !status.is_success() {
            return handle_error_response(status, response).await;
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::LLMError(format!("Failed to parse response: {}", e)))?;

        chat_response
            .first_content()
            .map(|content| content.trim().to_string())
            .ok_or_else(|| Error::LLMError("Empty response from API".to_string()))
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.complete(vec![Message::user(prompt)]).await
    }
}

/// Map a non-success HTTP status to an error
pub(crate) async fn handle_error_response<T>(
    status: reqwest::StatusCode,
    response: reqwest::Response,
) -> Result<T> {
    let body = response.text().await.unwrap_or_default();

    match status.as_u16() {
        401 | 403 => Err(Error::LLMError(format!(
            "Unauthorized ({}): check HYRA_JUDGE_API_KEY or GOOGLE_API_KEY",
            status
        ))),
        400 => Err(Error::LLMError(format!("Bad request: {}", body))),
        404 => Err(Error::LLMError(format!(
            "Model not found or endpoint unavailable: {}",
            body
        ))),
        429 => Err(Error::LLMError(format!("Rate limited: {}", body))),
        500..=599 => Err(Error::LLMError(format!("Server error ({}): {}", status, body))),
        _ => Err(Error::LLMError(format!("HTTP error {}: {}", status, body))),
    }
}
