//! Types for adaptive model routing
//!
//! Reference data (domains, models), the per-(model, domain) metrics row and
//! its reward/penalty transitions, scoring weights, and the per-request
//! result handed back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A category of request under which models are scored independently
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    /// Database identifier
    pub id: i64,
    /// Human-readable label the classifier must return
    pub name: String,
    /// Whether answers in this domain have no single ground truth
    pub subjective: bool,
}

/// A candidate inference backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Database identifier
    pub id: i64,
    /// Backend model name (e.g., "opt-125m")
    pub name: String,
    /// Provider namespace (e.g., "facebook")
    pub provider: String,
    /// Fixed monetary cost per call
    pub cost: f64,
}

impl Model {
    /// Identifier sent to the inference backend
    pub fn backend_identifier(&self) -> String {
        format!("{}/{}", self.provider, self.name)
    }

    /// Cost multiplier in (0, 1], decreasing in cost
    pub fn cost_factor(&self) -> f64 {
        1.0 / (1.0 + self.cost.max(0.0))
    }
}

/// Linear-combination weights for the quality score
///
/// Every key is required; weights must be finite and non-negative but need
/// not sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub accuracy: f64,
    pub fluency: f64,
    pub confidence: f64,
    pub latency: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            accuracy: 0.5,
            fluency: 0.2,
            confidence: 0.2,
            latency: 0.1,
        }
    }
}

impl ScoreWeights {
    /// Create a new set of weights
    pub fn new(accuracy: f64, fluency: f64, confidence: f64, latency: f64) -> Self {
        Self {
            accuracy,
            fluency,
            confidence,
            latency,
        }
    }

    /// Reject negative or non-finite weights
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("accuracy", self.accuracy),
            ("fluency", self.fluency),
            ("confidence", self.confidence),
            ("latency", self.latency),
        ];
        for (name, value) in named {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidWeights(format!(
                    "{} weight must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Metric values assumed for a (model, domain) pair with no row yet
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColdStartDefaults {
    pub accuracy: f64,
    pub fluency: f64,
    pub confidence: f64,
    pub latency_ms: f64,
}

impl Default for ColdStartDefaults {
    fn default() -> Self {
        Self {
            accuracy: 0.5,
            fluency: 0.5,
            confidence: 0.5,
            latency_ms: 1000.0,
        }
    }
}

impl ColdStartDefaults {
    /// Quality priors must sit in [0, 1] and latency must be positive
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("accuracy", self.accuracy),
            ("fluency", self.fluency),
            ("confidence", self.confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::ConfigError(format!(
                    "cold start {} must be between 0.0 and 1.0, got {}",
                    name, value
                )));
            }
        }
        if !self.latency_ms.is_finite() || self.latency_ms <= 0.0 {
            return Err(Error::ConfigError(
                "cold start latency_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Values observed for one routed request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservedMetrics {
    /// Judge accuracy in [0, 1]
    pub accuracy: f64,
    /// Judge fluency in [0, 1]
    pub fluency: f64,
    /// Geometric-mean token probability in [0, 1]
    pub confidence: f64,
    /// Wall-clock inference latency
    pub latency_ms: f64,
    /// Total tokens reported by the backend
    pub tokens: u32,
}

/// Running statistics for a (model, domain) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub model_id: i64,
    pub domain_id: i64,
    pub accuracy_score: f64,
    pub fluency_score: f64,
    pub confidence: f64,
    pub latency_ms: f64,
    pub tokens_per_query: f64,
    /// Reward observations folded into the running means
    pub usage_count: u64,
    /// Penalty observations
    pub failure_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl ModelMetrics {
    /// Row stand-in for a pair that has never been observed
    pub fn cold_start(model_id: i64, domain_id: i64, defaults: &ColdStartDefaults) -> Self {
        Self {
            model_id,
            domain_id,
            accuracy_score: defaults.accuracy,
            fluency_score: defaults.fluency,
            confidence: defaults.confidence,
            latency_ms: defaults.latency_ms,
            tokens_per_query: 0.0,
            usage_count: 0,
            failure_count: 0,
            last_updated: Utc::now(),
        }
    }

    /// First row for a pair: the observation is stored verbatim
    pub fn first_observation(
        model_id: i64,
        domain_id: i64,
        observed: &ObservedMetrics,
        passed: bool,
    ) -> Self {
        Self {
            model_id,
            domain_id,
            accuracy_score: observed.accuracy.clamp(0.0, 1.0),
            fluency_score: observed.fluency.clamp(0.0, 1.0),
            confidence: observed.confidence.clamp(0.0, 1.0),
            latency_ms: observed.latency_ms.max(0.0),
            tokens_per_query: f64::from(observed.tokens),
            usage_count: u64::from(passed),
            failure_count: u64::from(!passed),
            last_updated: Utc::now(),
        }
    }

    /// Fold a passing observation into the running means
    pub fn reward(&mut self, observed: &ObservedMetrics) {
        let n = self.usage_count as f64;
        let next = n + 1.0;
        let mean = |old: f64, new: f64| (old * n + new) / next;

        self.accuracy_score = mean(self.accuracy_score, observed.accuracy).clamp(0.0, 1.0);
        self.fluency_score = mean(self.fluency_score, observed.fluency).clamp(0.0, 1.0);
        self.confidence = mean(self.confidence, observed.confidence).clamp(0.0, 1.0);
        self.latency_ms = mean(self.latency_ms, observed.latency_ms.max(0.0));
        self.tokens_per_query = mean(self.tokens_per_query, f64::from(observed.tokens));
        self.usage_count += 1;
        self.last_updated = Utc::now();
    }

    /// Decay the quality scores after a failed verification
    ///
    /// Latency and token usage are untouched.
    pub fn penalize(&mut self, multiplier: f64) {
        let multiplier = multiplier.clamp(0.0, 1.0);
        self.accuracy_score *= multiplier;
        self.fluency_score *= multiplier;
        self.confidence *= multiplier;
        self.failure_count += 1;
        self.last_updated = Utc::now();
    }
}

/// Metrics reported back to the caller for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub accuracy: f64,
    pub fluency: f64,
    pub confidence: f64,
    pub latency_ms: f64,
    pub tokens: u32,
}

impl From<ObservedMetrics> for MetricsSnapshot {
    fn from(observed: ObservedMetrics) -> Self {
        Self {
            accuracy: observed.accuracy,
            fluency: observed.fluency,
            confidence: observed.confidence,
            latency_ms: observed.latency_ms,
            tokens: observed.tokens,
        }
    }
}

/// Result of routing one request end to end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingResult {
    /// Domain the request was classified into
    pub domain: String,
    /// Display name of the chosen model
    pub model: String,
    /// Provider of the chosen model
    pub provider: String,
    /// Generated text (empty if inference failed)
    pub output: String,
    /// Observed metrics for this request
    pub metrics: MetricsSnapshot,
    /// Whether the verification judge passed the answer
    pub verified: bool,
}
