//! Inference backends the router dispatches prompts to

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use tracing::debug;

use crate::config::InferenceConfig;
use crate::error::{Error, Result};
use crate::llm::{CompletionRequest, CompletionResponse, Usage, handle_error_response};
use crate::routing::Model;

/// Raw output of one backend call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendCompletion {
    pub text: String,
    /// Per-token log-probabilities, if the backend reported them
    pub token_logprobs: Option<Vec<f64>>,
    pub usage: Usage,
}

/// A text-completion service that can serve any registered model
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn complete(&self, model: &Model, prompt: &str) -> Result<BackendCompletion>;
}

/// Client for a vLLM-style `/completions` endpoint
#[derive(Debug, Clone)]
pub struct CompletionClient {
    http_client: HttpClient,
    base_url: String,
    max_tokens: usize,
    temperature: f32,
}

impl CompletionClient {
    /// Create a client from the inference section of the configuration
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl InferenceBackend for CompletionClient {
    async fn complete(&self, model: &Model, prompt: &str) -> Result<BackendCompletion> {
        let request = CompletionRequest {
            model: model.backend_identifier(),
            prompt: prompt.to_string(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            logprobs: 1,
        };

        let url = format!("{}/completions", self.base_url);
        debug!(model = %request.model, "Sending completion request");

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(Error::NetworkError)?;

        let status = response.status();
        if !status.is_success() {
            return handle_error_response(status, response).await;
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::LLMError(format!("Failed to parse completion: {}", e)))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::LLMError("Completion returned no choices".to_string()))?;

        let token_logprobs = choice
            .logprobs
            .map(|lp| lp.token_logprobs.into_iter().flatten().collect::<Vec<_>>());

        Ok(BackendCompletion {
            text: choice.text.trim().to_string(),
            token_logprobs,
            usage: body.usage.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn model() -> Model {
        Model {
            id: 1,
            name: "opt-125m".to_string(),
            provider: "facebook".to_string(),
            cost: 0.0,
        }
    }

    fn client(base_url: &str) -> CompletionClient {
        CompletionClient::new(&InferenceConfig {
            base_url: base_url.to_string(),
            ..InferenceConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_completion_payload_and_parsing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "facebook/opt-125m",
                "max_tokens": 128,
                "logprobs": 1
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{
                    "text": "  Paris.\n",
                    "logprobs": { "token_logprobs": [null, -0.1, -0.2] }
                }],
                "usage": { "prompt_tokens": 8, "completion_tokens": 3, "total_tokens": 11 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let completion = client(&server.uri())
            .complete(&model(), "What is the capital of France?")
            .await
            .unwrap();

        assert_eq!(completion.text, "Paris.");
        assert_eq!(completion.token_logprobs, Some(vec![-0.1, -0.2]));
        assert_eq!(completion.usage.total_tokens, 11);
    }

    #[tokio::test]
    async fn test_missing_logprobs_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "text": "hello" }]
            })))
            .mount(&server)
            .await;

        let completion = client(&server.uri()).complete(&model(), "hi").await.unwrap();
        assert!(completion.token_logprobs.is_none());
        assert_eq!(completion.usage, Usage::default());
    }

    #[tokio::test]
    async fn test_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert!(client(&server.uri()).complete(&model(), "hi").await.is_err());
    }
}
