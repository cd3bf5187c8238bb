//! Benchmark runner
//!
//! Runs `models × items` sequentially. Each answer is graded by the accuracy
//! judge and the fluency judge concurrently, and the observation goes through
//! [`MetricsUpdater`], the same single writer the router uses.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::eval_set::{EvalItem, EvalSet};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::evaluation::{AccuracyJudge, FluencyJudge, LlmAccuracyJudge, LlmFluencyJudge, bounded};
use crate::inference::{CompletionClient, Dispatcher};
use crate::llm::{LlmClient, TextGenerator};
use crate::routing::{Domain, MetricsStore, MetricsUpdater, Model, ObservedMetrics};

/// One model's graded answer to one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    pub model_id: i64,
    pub model: String,
    pub domain: String,
    pub question: String,
    pub expected_answer: String,
    pub response: String,
    pub accuracy: f64,
    pub fluency: f64,
    pub confidence: f64,
    pub latency_ms: f64,
    pub tokens: u32,
    pub passed: bool,
}

/// Per-model aggregate over a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub model_id: i64,
    pub model: String,
    pub runs: usize,
    pub passed: usize,
    pub mean_accuracy: f64,
    pub mean_fluency: f64,
    pub mean_latency_ms: f64,
}

/// Everything a benchmark run observed, in run order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub records: Vec<BenchmarkRecord>,
}

impl BenchmarkReport {
    /// Aggregate the records per model, in the order models first appear
    pub fn summaries(&self) -> Vec<ModelSummary> {
        let mut summaries: Vec<ModelSummary> = Vec::new();

        for record in &self.records {
            let index = match summaries.iter().position(|s| s.model_id == record.model_id) {
                Some(index) => index,
                None => {
                    summaries.push(ModelSummary {
                        model_id: record.model_id,
                        model: record.model.clone(),
                        runs: 0,
                        passed: 0,
                        mean_accuracy: 0.0,
                        mean_fluency: 0.0,
                        mean_latency_ms: 0.0,
                    });
                    summaries.len() - 1
                }
            };
            let summary = &mut summaries[index];
            summary.runs += 1;
            summary.passed += usize::from(record.passed);
            summary.mean_accuracy += record.accuracy;
            summary.mean_fluency += record.fluency;
            summary.mean_latency_ms += record.latency_ms;
        }

        for summary in &mut summaries {
            let n = summary.runs as f64;
            summary.mean_accuracy /= n;
            summary.mean_fluency /= n;
            summary.mean_latency_ms /= n;
        }
        summaries
    }
}

/// Runs an evaluation set against candidate models and records the results
pub struct Benchmark {
    store: Arc<dyn MetricsStore>,
    updater: Arc<MetricsUpdater>,
    dispatcher: Dispatcher,
    accuracy: Arc<dyn AccuracyJudge>,
    fluency: Arc<dyn FluencyJudge>,
    pass_threshold: f64,
    judge_timeout: Duration,
}

impl Benchmark {
    pub fn new(
        store: Arc<dyn MetricsStore>,
        updater: Arc<MetricsUpdater>,
        dispatcher: Dispatcher,
        accuracy: Arc<dyn AccuracyJudge>,
        fluency: Arc<dyn FluencyJudge>,
    ) -> Self {
        Self {
            store,
            updater,
            dispatcher,
            accuracy,
            fluency,
            pass_threshold: 0.5,
            judge_timeout: Duration::from_secs(60),
        }
    }

    /// Wire the HTTP-backed judges and backend described by `config`
    pub fn from_config(config: &Config, store: Arc<dyn MetricsStore>) -> Result<Self> {
        let judge: Arc<dyn TextGenerator> = Arc::new(LlmClient::from_config(&config.judge)?);
        let backend = Arc::new(CompletionClient::new(&config.inference)?);
        let updater = Arc::new(MetricsUpdater::new(
            Arc::clone(&store),
            config.routing.penalties.verification_fail_multiplier,
        )?);

        Ok(Self::new(
            store,
            updater,
            Dispatcher::new(backend, Duration::from_secs(config.inference.timeout_secs)),
            Arc::new(LlmAccuracyJudge::new(Arc::clone(&judge))),
            Arc::new(LlmFluencyJudge::new(judge)),
        )
        .with_pass_threshold(config.routing.pass_threshold)
        .with_judge_timeout(Duration::from_secs(config.judge.timeout_secs)))
    }

    /// Minimum accuracy for an answer to count as passed
    pub fn with_pass_threshold(mut self, threshold: f64) -> Self {
        self.pass_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_judge_timeout(mut self, timeout: Duration) -> Self {
        self.judge_timeout = timeout;
        self
    }

    /// Run every item against every model
    ///
    /// All item domains are resolved before anything is dispatched, so an
    /// unknown domain fails the run without writing any metrics.
    pub async fn run(&self, set: &EvalSet, models: &[Model]) -> Result<BenchmarkReport> {
        let domains = self.resolve_domains(set).await?;
        if models.is_empty() {
            let domain = set
                .items()
                .first()
                .map(|item| item.domain.clone())
                .unwrap_or_default();
            return Err(Error::NoCandidates(domain));
        }

        let mut report = BenchmarkReport::default();
        for (item, domain) in set.items().iter().zip(&domains) {
            for model in models {
                let record = self.run_one(item, domain, model).await?;
                report.records.push(record);
            }
        }

        info!(
            items = set.len(),
            models = models.len(),
            passed = report.records.iter().filter(|r| r.passed).count(),
            "Benchmark finished"
        );
        Ok(report)
    }

    async fn resolve_domains(&self, set: &EvalSet) -> Result<Vec<Domain>> {
        let known = self.store.list_domains().await?;
        set.items()
            .iter()
            .map(|item| {
                known
                    .iter()
                    .find(|d| d.name == item.domain)
                    .cloned()
                    .ok_or_else(|| Error::UnknownDomain(item.domain.clone()))
            })
            .collect()
    }

    async fn run_one(
        &self,
        item: &EvalItem,
        domain: &Domain,
        model: &Model,
    ) -> Result<BenchmarkRecord> {
        let outcome = self.dispatcher.run(model, &item.question).await;

        let (accuracy, fluency) = if outcome.failed {
            (0.0, 0.0)
        } else {
            self.grade(item, domain, &outcome.text).await
        };
        let passed = !outcome.failed && accuracy >= self.pass_threshold;

        let observed = ObservedMetrics {
            accuracy,
            fluency,
            confidence: outcome.confidence,
            latency_ms: outcome.latency_ms,
            tokens: outcome.total_tokens,
        };
        self.updater
            .update(model.id, domain.id, &observed, passed)
            .await?;

        Ok(BenchmarkRecord {
            model_id: model.id,
            model: model.backend_identifier(),
            domain: domain.name.clone(),
            question: item.question.clone(),
            expected_answer: item.expected_answer.clone(),
            response: outcome.text,
            accuracy,
            fluency,
            confidence: outcome.confidence,
            latency_ms: outcome.latency_ms,
            tokens: outcome.total_tokens,
            passed,
        })
    }

    /// Accuracy and fluency of `output`; a failed judge scores 0.0
    async fn grade(&self, item: &EvalItem, domain: &Domain, output: &str) -> (f64, f64) {
        // Subjective domains have no single right answer to compare against
        let expected = (!domain.subjective).then_some(item.expected_answer.as_str());

        let (accuracy, fluency) = tokio::join!(
            bounded(
                "accuracy judge",
                self.judge_timeout,
                self.accuracy.accuracy(&item.question, expected, output)
            ),
            bounded("fluency judge", self.judge_timeout, self.fluency.fluency(output)),
        );

        let accuracy = accuracy.map(|s| s.score.clamp(0.0, 1.0)).unwrap_or_else(|e| {
            warn!(error = %e, question = %item.question, "Accuracy judge failed, using 0.0");
            0.0
        });
        let fluency = fluency.map(|s| s.score.clamp(0.0, 1.0)).unwrap_or_else(|e| {
            warn!(error = %e, "Fluency judge failed, using 0.0");
            0.0
        });
        (accuracy, fluency)
    }
}

impl std::fmt::Debug for Benchmark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Benchmark")
            .field("dispatcher", &self.dispatcher)
            .field("updater", &self.updater)
            .field("pass_threshold", &self.pass_threshold)
            .field("judge_timeout", &self.judge_timeout)
            .finish()
    }
}
