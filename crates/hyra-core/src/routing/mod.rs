//! Adaptive model routing
//!
//! Picks, per request, the registered model expected to answer best for the
//! request's domain, then learns from how the answer was judged.
//!
//! - **Classifier**: labels a prompt with a domain, behind a bounded LRU cache.
//!
//! - **Scorer**: ranks models by a weighted blend of accuracy, fluency,
//!   confidence and latency, discounted by cost.
//!
//! - **Updater**: folds each judged observation into the (model, domain)
//!   metrics row as a running-mean reward or a multiplicative penalty.
//!
//! - **Store**: SQLite persistence for domains, models and metrics.
//!
//! ## How It Works
//!
//! 1. The prompt is classified into one of the known domains
//! 2. The best-scoring model for that domain is selected
//! 3. The prompt is dispatched and the answer judged for correctness and fluency
//! 4. The metrics row for the (model, domain) pair is updated
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hyra_core::config::Config;
//! use hyra_core::routing::{RouterBuilder, SqliteMetricsStore};
//! use hyra_core::storage::Database;
//!
//! let config = Config::load()?;
//! let db = Database::open(config.database_path()?).await?;
//! let store = Arc::new(SqliteMetricsStore::new(db.pool().clone()));
//!
//! let router = RouterBuilder::from_config(&config, store)?.build()?;
//! let result = router.route("What is the capital of France?").await?;
//! println!("{} answered: {}", result.model, result.output);
//! ```

mod cache;
mod classifier;
mod observer;
mod router;
mod scorer;
mod store;
mod types;
mod updater;

pub use cache::ClassificationCache;
pub use classifier::{ClassifierOracle, DomainClassifier, LlmDomainClassifier};
pub use observer::{NoopObserver, RouteObserver, RouteStage, TracingObserver};
pub use router::{Router, RouterBuilder};
pub use scorer::{
    LATENCY_CEILING_MS, LATENCY_FLOOR_MS, ModelScorer, ScoredModel, normalize_latency,
    quality_score, rank_candidates,
};
pub use store::{MetricsStore, MetricsTransition, SqliteMetricsStore};
pub use types::{
    ColdStartDefaults, Domain, MetricsSnapshot, Model, ModelMetrics, ObservedMetrics,
    RoutingResult, ScoreWeights,
};
pub use updater::MetricsUpdater;
