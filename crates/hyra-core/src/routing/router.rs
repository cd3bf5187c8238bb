//! Adaptive router
//!
//! Runs one request through `Classify -> SelectModel -> Dispatch ->
//! {Verify || Fluency} -> UpdateMetrics -> Respond`. Oracle and backend
//! failures degrade to default values; an unknown domain or an empty model
//! pool ends the request before any metrics are written.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use super::cache::ClassificationCache;
use super::classifier::{ClassifierOracle, DomainClassifier, LlmDomainClassifier};
use super::observer::{NoopObserver, RouteObserver, RouteStage};
use super::scorer::ModelScorer;
use super::store::MetricsStore;
use super::types::{ObservedMetrics, RoutingResult, ScoreWeights};
use super::updater::MetricsUpdater;
use crate::config::{Config, RoutingConfig, VerificationMode};
use crate::error::{Error, Result};
use crate::evaluation::{
    Evaluator, FluencyJudge, LlmAccuracyJudge, LlmFluencyJudge, LlmVerifier, ReferenceVerifier,
    VerificationJudge,
};
use crate::inference::{CompletionClient, Dispatcher, InferenceBackend};
use crate::llm::{LlmClient, TextGenerator};

/// Request-scoped pipeline over shared collaborators
///
/// A `Router` is `Send + Sync`; share it behind an `Arc` and call
/// [`Router::route`] from as many tasks as needed.
pub struct Router {
    store: Arc<dyn MetricsStore>,
    classifier: DomainClassifier,
    scorer: ModelScorer,
    dispatcher: Dispatcher,
    evaluator: Evaluator,
    updater: Arc<MetricsUpdater>,
    weights: ScoreWeights,
    observer: Arc<dyn RouteObserver>,
}

/// Builder for creating a Router
pub struct RouterBuilder {
    config: RoutingConfig,
    store: Option<Arc<dyn MetricsStore>>,
    classifier: Option<Arc<dyn ClassifierOracle>>,
    backend: Option<Arc<dyn InferenceBackend>>,
    verifier: Option<Arc<dyn VerificationJudge>>,
    fluency: Option<Arc<dyn FluencyJudge>>,
    updater: Option<Arc<MetricsUpdater>>,
    observer: Arc<dyn RouteObserver>,
    cache: Option<ClassificationCache>,
    inference_timeout: Duration,
    judge_timeout: Duration,
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            config: RoutingConfig::default(),
            store: None,
            classifier: None,
            backend: None,
            verifier: None,
            fluency: None,
            updater: None,
            observer: Arc::new(NoopObserver),
            cache: None,
            inference_timeout: Duration::from_secs(60),
            judge_timeout: Duration::from_secs(60),
        }
    }

    /// Wire the HTTP-backed collaborators described by `config`
    ///
    /// The classifier and judges share one chat client; inference goes to the
    /// completion endpoint. `verification = "reference"` swaps the single-call
    /// verifier for reference-answer grading.
    pub fn from_config(config: &Config, store: Arc<dyn MetricsStore>) -> Result<Self> {
        let judge: Arc<dyn TextGenerator> = Arc::new(LlmClient::from_config(&config.judge)?);
        let backend = Arc::new(CompletionClient::new(&config.inference)?);

        let verifier: Arc<dyn VerificationJudge> = match config.routing.verification {
            VerificationMode::Direct => Arc::new(LlmVerifier::new(Arc::clone(&judge))),
            VerificationMode::Reference => Arc::new(ReferenceVerifier::new(
                Arc::clone(&judge),
                Arc::new(LlmAccuracyJudge::new(Arc::clone(&judge))),
                config.routing.pass_threshold,
            )),
        };

        Ok(Self::new()
            .config(config.routing.clone())
            .store(store)
            .classifier(Arc::new(LlmDomainClassifier::new(Arc::clone(&judge))))
            .backend(backend)
            .verifier(verifier)
            .fluency_judge(Arc::new(LlmFluencyJudge::new(judge)))
            .inference_timeout(Duration::from_secs(config.inference.timeout_secs))
            .judge_timeout(Duration::from_secs(config.judge.timeout_secs)))
    }

    /// Set the routing configuration (weights, penalties, fallback domain)
    pub fn config(mut self, config: RoutingConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the score weights
    pub fn weights(mut self, weights: ScoreWeights) -> Self {
        self.config.weights = weights;
        self
    }

    pub fn store(mut self, store: Arc<dyn MetricsStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn classifier(mut self, oracle: Arc<dyn ClassifierOracle>) -> Self {
        self.classifier = Some(oracle);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn InferenceBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn verifier(mut self, verifier: Arc<dyn VerificationJudge>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn fluency_judge(mut self, judge: Arc<dyn FluencyJudge>) -> Self {
        self.fluency = Some(judge);
        self
    }

    /// Share a metrics updater between routers over the same store
    pub fn updater(mut self, updater: Arc<MetricsUpdater>) -> Self {
        self.updater = Some(updater);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn RouteObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Use a pre-built classification cache instead of a fresh one
    pub fn cache(mut self, cache: ClassificationCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn inference_timeout(mut self, timeout: Duration) -> Self {
        self.inference_timeout = timeout;
        self
    }

    pub fn judge_timeout(mut self, timeout: Duration) -> Self {
        self.judge_timeout = timeout;
        self
    }

    /// Build the Router
    pub fn build(self) -> Result<Router> {
        self.config.weights.validate()?;

        let store = self.store.ok_or_else(|| missing("metrics store"))?;
        let oracle = self.classifier.ok_or_else(|| missing("domain classifier"))?;
        let backend = self.backend.ok_or_else(|| missing("inference backend"))?;
        let verifier = self.verifier.ok_or_else(|| missing("verification judge"))?;
        let fluency = self.fluency.ok_or_else(|| missing("fluency judge"))?;

        let updater = match self.updater {
            Some(updater) => updater,
            None => Arc::new(MetricsUpdater::new(
                Arc::clone(&store),
                self.config.penalties.verification_fail_multiplier,
            )?),
        };

        let cache = self
            .cache
            .unwrap_or_else(|| ClassificationCache::new(self.config.classifier_cache_capacity));

        Ok(Router {
            classifier: DomainClassifier::new(oracle, cache)
                .with_fallback(self.config.default_domain.clone())
                .with_timeout(self.judge_timeout),
            scorer: ModelScorer::new(Arc::clone(&store), self.config.cold_start),
            dispatcher: Dispatcher::new(backend, self.inference_timeout),
            evaluator: Evaluator::new(verifier, fluency, self.judge_timeout),
            updater,
            weights: self.config.weights,
            observer: self.observer,
            store,
        })
    }
}

fn missing(what: &str) -> Error {
    Error::ConfigError(format!("Router requires a {}", what))
}

impl Router {
    /// Create a new builder for Router
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    pub fn classifier(&self) -> &DomainClassifier {
        &self.classifier
    }

    pub fn scorer(&self) -> &ModelScorer {
        &self.scorer
    }

    /// Route one prompt end to end
    ///
    /// Returns either a complete result or the single fatal error that ended
    /// the request (unknown domain, no candidates, store failure).
    pub async fn route(&self, prompt: &str) -> Result<RoutingResult> {
        let request_id = Uuid::new_v4();
        let result = self.run(request_id, prompt).await;

        match &result {
            Ok(routed) => {
                self.observer.stage_finished(
                    request_id,
                    RouteStage::Respond,
                    &serde_json::to_value(routed).unwrap_or(Value::Null),
                );
                info!(
                    request_id = %request_id,
                    domain = %routed.domain,
                    model = %routed.model,
                    verified = routed.verified,
                    "Request routed"
                );
            }
            Err(e) => {
                self.observer.stage_finished(
                    request_id,
                    RouteStage::Respond,
                    &json!({ "error": e.to_string(), "code": e.code() }),
                );
                warn!(request_id = %request_id, error = %e, "Routing failed");
            }
        }
        result
    }

    async fn run(&self, request_id: Uuid, prompt: &str) -> Result<RoutingResult> {
        let observer = &self.observer;

        // Classify
        observer.stage_started(request_id, RouteStage::Classify, &json!({ "prompt": prompt }));
        let domains = self.store.list_domains().await?;
        let names: Vec<String> = domains.iter().map(|d| d.name.clone()).collect();
        let label = self.classifier.classify(prompt, &names).await;
        let domain = domains
            .into_iter()
            .find(|d| d.name == label)
            .ok_or(Error::UnknownDomain(label))?;
        observer.stage_finished(
            request_id,
            RouteStage::Classify,
            &json!({ "domain": domain.name, "domain_id": domain.id }),
        );

        // SelectModel
        observer.stage_started(
            request_id,
            RouteStage::SelectModel,
            &json!({ "domain_id": domain.id }),
        );
        let selected = self.scorer.select_best_model(&domain, &self.weights).await?;
        let model = selected.model;
        observer.stage_finished(
            request_id,
            RouteStage::SelectModel,
            &json!({
                "model_id": model.id,
                "model_name": model.name,
                "provider": model.provider,
                "score": selected.score,
            }),
        );

        // Dispatch
        observer.stage_started(
            request_id,
            RouteStage::Dispatch,
            &json!({ "prompt": prompt, "model": model.backend_identifier() }),
        );
        let outcome = self.dispatcher.run(&model, prompt).await;
        observer.stage_finished(
            request_id,
            RouteStage::Dispatch,
            &serde_json::to_value(&outcome).unwrap_or(Value::Null),
        );

        // Verify || Fluency
        observer.stage_started(
            request_id,
            RouteStage::Evaluate,
            &json!({ "output": outcome.text }),
        );
        let evaluation = self.evaluator.evaluate(&domain, prompt, &outcome.text).await;
        observer.stage_finished(
            request_id,
            RouteStage::Evaluate,
            &serde_json::to_value(evaluation).unwrap_or(Value::Null),
        );

        let observed = ObservedMetrics {
            accuracy: evaluation.accuracy,
            fluency: evaluation.fluency,
            confidence: outcome.confidence,
            latency_ms: outcome.latency_ms,
            tokens: outcome.total_tokens,
        };

        // UpdateMetrics
        observer.stage_started(
            request_id,
            RouteStage::UpdateMetrics,
            &json!({ "metrics": observed, "verified": evaluation.passed }),
        );
        let row = self
            .updater
            .update(model.id, domain.id, &observed, evaluation.passed)
            .await?;
        observer.stage_finished(
            request_id,
            RouteStage::UpdateMetrics,
            &json!({ "usage_count": row.usage_count, "failure_count": row.failure_count }),
        );

        // Respond
        observer.stage_started(request_id, RouteStage::Respond, &Value::Null);
        Ok(RoutingResult {
            domain: domain.name,
            model: model.name,
            provider: model.provider,
            output: outcome.text,
            metrics: observed.into(),
            verified: evaluation.passed,
        })
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("weights", &self.weights)
            .field("dispatcher", &self.dispatcher)
            .field("evaluator", &self.evaluator)
            .field("updater", &self.updater)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{JudgeScore, Verdict};
    use crate::inference::BackendCompletion;
    use crate::llm::Usage;
    use crate::routing::store::SqliteMetricsStore;
    use crate::routing::types::{Domain, Model};
    use crate::storage::Database;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedOracle {
        label: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ClassifierOracle for FixedOracle {
        async fn classify(&self, _prompt: &str, _candidates: &[String]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.label.to_string())
        }
    }

    struct ParisBackend {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InferenceBackend for ParisBackend {
        async fn complete(&self, _model: &Model, _prompt: &str) -> Result<BackendCompletion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::LLMError("backend down".to_string()));
            }
            Ok(BackendCompletion {
                text: "Paris".to_string(),
                token_logprobs: Some(vec![-0.1, -0.2]),
                usage: Usage {
                    prompt_tokens: 8,
                    completion_tokens: 2,
                    total_tokens: 10,
                },
            })
        }
    }

    struct ExactVerifier;

    #[async_trait]
    impl VerificationJudge for ExactVerifier {
        async fn verify(&self, _domain: &Domain, _prompt: &str, output: &str) -> Result<Verdict> {
            let passed = output == "Paris";
            Ok(Verdict {
                accuracy: if passed { 1.0 } else { 0.0 },
                passed,
            })
        }
    }

    struct FixedFluency;

    #[async_trait]
    impl FluencyJudge for FixedFluency {
        async fn fluency(&self, _output: &str) -> Result<JudgeScore> {
            Ok(JudgeScore {
                score: 0.9,
                reason: String::new(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<(&'static str, RouteStage)>>,
    }

    impl RouteObserver for RecordingObserver {
        fn stage_started(&self, _request_id: Uuid, stage: RouteStage, _input: &Value) {
            self.events.lock().unwrap().push(("start", stage));
        }

        fn stage_finished(&self, _request_id: Uuid, stage: RouteStage, _output: &Value) {
            self.events.lock().unwrap().push(("finish", stage));
        }
    }

    struct Fixture {
        store: Arc<SqliteMetricsStore>,
        oracle: Arc<FixedOracle>,
        backend: Arc<ParisBackend>,
        observer: Arc<RecordingObserver>,
        router: Router,
    }

    async fn fixture(label: &'static str, fail_backend: bool, register_model: bool) -> Fixture {
        let db = Database::in_memory().await.unwrap();
        let store = Arc::new(SqliteMetricsStore::new(db.pool().clone()));
        if register_model {
            store.add_model("llama-3-8b", "meta", 0.0).await.unwrap();
        }

        let oracle = Arc::new(FixedOracle {
            label,
            calls: AtomicUsize::new(0),
        });
        let backend = Arc::new(ParisBackend {
            fail: fail_backend,
            calls: AtomicUsize::new(0),
        });
        let observer = Arc::new(RecordingObserver::default());

        let router = Router::builder()
            .store(store.clone())
            .classifier(oracle.clone())
            .backend(backend.clone())
            .verifier(Arc::new(ExactVerifier))
            .fluency_judge(Arc::new(FixedFluency))
            .observer(observer.clone())
            .build()
            .unwrap();

        Fixture {
            store,
            oracle,
            backend,
            observer,
            router,
        }
    }

    #[tokio::test]
    async fn test_route_factual_question() {
        let f = fixture("Factual Q&A", false, true).await;

        let result = f.router.route("What is the capital of France?").await.unwrap();
        assert_eq!(result.domain, "Factual Q&A");
        assert_eq!(result.model, "llama-3-8b");
        assert_eq!(result.provider, "meta");
        assert_eq!(result.output, "Paris");
        assert!(result.verified);
        assert_eq!(result.metrics.accuracy, 1.0);
        assert_eq!(result.metrics.tokens, 10);
        assert!((result.metrics.confidence - (-0.15f64).exp()).abs() < 1e-12);

        let domain = f.store.find_domain("Factual Q&A").await.unwrap().unwrap();
        let model = f.store.list_models().await.unwrap().remove(0);
        let row = f.store.get_metrics(model.id, domain.id).await.unwrap().unwrap();
        assert_eq!(row.usage_count, 1);
        assert_eq!(row.failure_count, 0);
    }

    #[tokio::test]
    async fn test_unknown_domain_is_fatal_and_writes_nothing() {
        let f = fixture("Astrology", false, true).await;

        let err = f.router.route("What's my horoscope?").await.unwrap_err();
        assert!(matches!(err, Error::UnknownDomain(ref name) if name == "Astrology"));
        assert_eq!(f.backend.calls.load(Ordering::SeqCst), 0);

        for domain in f.store.list_domains().await.unwrap() {
            assert!(f.store.domain_metrics(domain.id).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_no_models_is_fatal() {
        let f = fixture("Factual Q&A", false, false).await;

        let err = f.router.route("What is the capital of France?").await.unwrap_err();
        assert!(matches!(err, Error::NoCandidates(_)));
        assert!(err.is_fatal());
        assert_eq!(f.backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_degrades_to_penalty() {
        let f = fixture("Factual Q&A", true, true).await;

        let result = f.router.route("What is the capital of France?").await.unwrap();
        assert_eq!(result.output, "");
        assert!(!result.verified);
        assert_eq!(result.metrics.confidence, 0.0);
        assert_eq!(result.metrics.tokens, 0);

        let domain = f.store.find_domain("Factual Q&A").await.unwrap().unwrap();
        let rows = f.store.domain_metrics(domain.id).await.unwrap();
        let row = rows.values().next().unwrap();
        assert_eq!(row.failure_count, 1);
        assert_eq!(row.usage_count, 0);
    }

    #[tokio::test]
    async fn test_repeated_prompt_hits_cache() {
        let f = fixture("Factual Q&A", false, true).await;

        f.router.route("What is the capital of France?").await.unwrap();
        f.router.route("What is the capital of France?").await.unwrap();

        assert_eq!(f.oracle.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(f.router.classifier().cache().len(), 1);
    }

    #[tokio::test]
    async fn test_observer_sees_every_stage_in_order() {
        let f = fixture("Factual Q&A", false, true).await;
        f.router.route("What is the capital of France?").await.unwrap();

        let stages: Vec<RouteStage> = f
            .observer
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|(kind, _)| *kind == "start")
            .map(|(_, stage)| *stage)
            .collect();
        assert_eq!(
            stages,
            vec![
                RouteStage::Classify,
                RouteStage::SelectModel,
                RouteStage::Dispatch,
                RouteStage::Evaluate,
                RouteStage::UpdateMetrics,
                RouteStage::Respond,
            ]
        );
    }

    struct PartialVerifier;

    #[async_trait]
    impl VerificationJudge for PartialVerifier {
        async fn verify(&self, _domain: &Domain, _prompt: &str, _output: &str) -> Result<Verdict> {
            Ok(Verdict {
                accuracy: 0.73,
                passed: true,
            })
        }
    }

    #[tokio::test]
    async fn test_cold_start_picks_free_model_and_records_judged_accuracy() {
        let db = Database::in_memory().await.unwrap();
        let store = Arc::new(SqliteMetricsStore::new(db.pool().clone()));
        // The paid model has the lower id, so only cost can break the tie
        let paid = store.add_model("paid", "test", 1.0).await.unwrap();
        let free = store.add_model("free", "test", 0.0).await.unwrap();

        let router = Router::builder()
            .store(store.clone())
            .classifier(Arc::new(FixedOracle {
                label: "Factual Q&A",
                calls: AtomicUsize::new(0),
            }))
            .backend(Arc::new(ParisBackend {
                fail: false,
                calls: AtomicUsize::new(0),
            }))
            .verifier(Arc::new(PartialVerifier))
            .fluency_judge(Arc::new(FixedFluency))
            .build()
            .unwrap();

        let result = router.route("What is the capital of France?").await.unwrap();
        assert_eq!(result.model, "free");
        assert!(result.verified);

        let domain = store.find_domain("Factual Q&A").await.unwrap().unwrap();
        let row = store.get_metrics(free.id, domain.id).await.unwrap().unwrap();
        assert_eq!(row.usage_count, 1);
        assert_eq!(row.failure_count, 0);
        assert!((row.accuracy_score - 0.73).abs() < 1e-12);
        assert!((row.fluency_score - 0.9).abs() < 1e-12);
        assert!(store.get_metrics(paid.id, domain.id).await.unwrap().is_none());
    }

    #[test]
    fn test_build_requires_collaborators() {
        let err = Router::builder().build().unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }
}
