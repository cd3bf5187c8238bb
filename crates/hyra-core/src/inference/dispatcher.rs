//! Inference dispatch with latency measurement and confidence scoring
//!
//! The dispatcher never returns an error: a failed or timed-out backend call
//! becomes a zeroed [`InferenceOutcome`] with `failed` set, so one bad backend
//! cannot abort a routing decision.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::backend::{BackendCompletion, InferenceBackend};
use crate::error::Error;
use crate::routing::Model;

/// Result of dispatching one prompt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceOutcome {
    pub text: String,
    /// Geometric mean of the per-token probabilities, 0.0 if unavailable
    pub confidence: f64,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub failed: bool,
    /// Wall-clock time spent waiting on the backend
    pub latency_ms: f64,
}

impl InferenceOutcome {
    /// Zeroed outcome for a failed call
    pub fn failure(latency_ms: f64) -> Self {
        Self {
            failed: true,
            latency_ms,
            ..Self::default()
        }
    }

    fn from_completion(completion: BackendCompletion, latency_ms: f64) -> Self {
        Self {
            confidence: compute_confidence(completion.token_logprobs.as_deref()),
            text: completion.text,
            prompt_tokens: completion.usage.prompt_tokens,
            completion_tokens: completion.usage.completion_tokens,
            total_tokens: completion.usage.total_tokens,
            failed: false,
            latency_ms,
        }
    }
}

/// `exp(mean(logprobs))`, or 0.0 when no log-probabilities were returned
pub fn compute_confidence(token_logprobs: Option<&[f64]>) -> f64 {
    let Some(logprobs) = token_logprobs.filter(|lp| !lp.is_empty()) else {
        return 0.0;
    };
    let mean = logprobs.iter().sum::<f64>() / logprobs.len() as f64;
    let confidence = mean.exp();
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// Sends prompts to the inference backend under a timeout
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn InferenceBackend>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn InferenceBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Run `prompt` against `model`
    pub async fn run(&self, model: &Model, prompt: &str) -> InferenceOutcome {
        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.backend.complete(model, prompt)).await;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let error = match result {
            Ok(Ok(completion)) => {
                let outcome = InferenceOutcome::from_completion(completion, latency_ms);
                debug!(
                    model = %model.backend_identifier(),
                    latency_ms = outcome.latency_ms,
                    confidence = outcome.confidence,
                    tokens = outcome.total_tokens,
                    "Inference completed"
                );
                return outcome;
            }
            Ok(Err(e)) => e,
            Err(_) => Error::Timeout("inference".to_string(), self.timeout.as_secs()),
        };

        warn!(model = %model.backend_identifier(), error = %error, "Inference failed");
        InferenceOutcome::failure(latency_ms)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::llm::Usage;
    use async_trait::async_trait;

    struct FixedBackend(Result<BackendCompletion>);

    #[async_trait]
    impl InferenceBackend for FixedBackend {
        async fn complete(&self, _model: &Model, _prompt: &str) -> Result<BackendCompletion> {
            match &self.0 {
                Ok(completion) => Ok(completion.clone()),
                Err(e) => Err(Error::LLMError(e.to_string())),
            }
        }
    }

    struct SlowBackend;

    #[async_trait]
    impl InferenceBackend for SlowBackend {
        async fn complete(&self, _model: &Model, _prompt: &str) -> Result<BackendCompletion> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(BackendCompletion::default())
        }
    }

    fn model() -> Model {
        Model {
            id: 1,
            name: "opt-125m".to_string(),
            provider: "facebook".to_string(),
            cost: 0.0,
        }
    }

    #[test]
    fn test_confidence_is_geometric_mean() {
        let confidence = compute_confidence(Some([-0.1, -0.2, -0.3].as_slice()));
        assert!((confidence - (-0.2f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_confidence_without_logprobs() {
        assert_eq!(compute_confidence(None), 0.0);
        let empty: [f64; 0] = [];
        assert_eq!(compute_confidence(Some(empty.as_slice())), 0.0);
    }

    #[test]
    fn test_confidence_bounds() {
        assert_eq!(compute_confidence(Some([0.0, 0.0].as_slice())), 1.0);
        assert_eq!(compute_confidence(Some([f64::NEG_INFINITY].as_slice())), 0.0);
    }

    #[tokio::test]
    async fn test_successful_dispatch() {
        let dispatcher = Dispatcher::new(
            Arc::new(FixedBackend(Ok(BackendCompletion {
                text: "Paris".to_string(),
                token_logprobs: Some(vec![-0.1, -0.2, -0.3]),
                usage: Usage {
                    prompt_tokens: 8,
                    completion_tokens: 3,
                    total_tokens: 11,
                },
            }))),
            Duration::from_secs(5),
        );

        let outcome = dispatcher.run(&model(), "capital of France?").await;
        assert!(!outcome.failed);
        assert_eq!(outcome.text, "Paris");
        assert_eq!(outcome.total_tokens, 11);
        assert!((outcome.confidence - (-0.2f64).exp()).abs() < 1e-12);
        assert!(outcome.latency_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_failed_dispatch_is_zeroed() {
        let dispatcher = Dispatcher::new(
            Arc::new(FixedBackend(Err(Error::LLMError("connection refused".to_string())))),
            Duration::from_secs(5),
        );

        let outcome = dispatcher.run(&model(), "hi").await;
        assert!(outcome.failed);
        assert_eq!(outcome.text, "");
        assert_eq!(outcome.confidence, 0.0);
        assert_eq!(outcome.prompt_tokens, 0);
        assert_eq!(outcome.completion_tokens, 0);
        assert_eq!(outcome.total_tokens, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_failure() {
        let dispatcher = Dispatcher::new(Arc::new(SlowBackend), Duration::from_secs(2));

        let outcome = dispatcher.run(&model(), "hi").await;
        assert!(outcome.failed);
        assert_eq!(outcome.total_tokens, 0);
    }
}
