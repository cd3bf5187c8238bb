//! Reward/penalty updates of per-(model, domain) metrics
//!
//! The read-modify-write of a metrics row is a single
//! [`MetricsStore::apply_metrics`] call, which the store makes atomic against
//! every other writer, including other processes sharing the database.
//! Within one process a per-pair async mutex additionally queues requests for
//! the same pair so they do not contend on the store's write lock. Updates to
//! different pairs proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::info;

use super::store::MetricsStore;
use super::types::{ModelMetrics, ObservedMetrics};
use crate::error::{Error, Result};

type PairKey = (i64, i64);

/// One async mutex per (model, domain) pair, created on first use
#[derive(Debug, Default)]
struct PairLocks {
    locks: Mutex<HashMap<PairKey, Arc<AsyncMutex<()>>>>,
}

impl PairLocks {
    async fn acquire(&self, key: PairKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(locks.entry(key).or_default())
        };
        lock.lock_owned().await
    }
}

/// Sole writer of [`ModelMetrics`] rows
pub struct MetricsUpdater {
    store: Arc<dyn MetricsStore>,
    fail_multiplier: f64,
    locks: PairLocks,
}

impl MetricsUpdater {
    /// Create an updater applying `fail_multiplier` on failed verification
    pub fn new(store: Arc<dyn MetricsStore>, fail_multiplier: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&fail_multiplier) {
            return Err(Error::ConfigError(format!(
                "verification_fail_multiplier must be between 0.0 and 1.0, got {}",
                fail_multiplier
            )));
        }
        Ok(Self {
            store,
            fail_multiplier,
            locks: PairLocks::default(),
        })
    }

    pub fn fail_multiplier(&self) -> f64 {
        self.fail_multiplier
    }

    /// Fold one observation into the pair's row and persist it
    ///
    /// The first observation of a pair is stored verbatim. Afterwards a
    /// passing observation updates the running means and `usage_count`; a
    /// failing one decays accuracy, fluency and confidence and bumps
    /// `failure_count`.
    pub async fn update(
        &self,
        model_id: i64,
        domain_id: i64,
        observed: &ObservedMetrics,
        passed: bool,
    ) -> Result<ModelMetrics> {
        let _guard = self.locks.acquire((model_id, domain_id)).await;

        let observed = *observed;
        let fail_multiplier = self.fail_multiplier;
        let row = self
            .store
            .apply_metrics(
                model_id,
                domain_id,
                Box::new(move |current| match current {
                    None => ModelMetrics::first_observation(model_id, domain_id, &observed, passed),
                    Some(mut row) => {
                        if passed {
                            row.reward(&observed);
                        } else {
                            row.penalize(fail_multiplier);
                        }
                        row
                    }
                }),
            )
            .await?;

        info!(
            model_id = model_id,
            domain_id = domain_id,
            passed = passed,
            accuracy = row.accuracy_score,
            usage_count = row.usage_count,
            failure_count = row.failure_count,
            "Updated model metrics"
        );
        Ok(row)
    }
}

impl std::fmt::Debug for MetricsUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsUpdater")
            .field("fail_multiplier", &self.fail_multiplier)
            .finish()
    }
}
