//! Multi-objective model scoring
//!
//! Each candidate's score for a domain is a weighted linear combination of
//! accuracy, fluency, confidence and normalised latency, scaled by a cost
//! factor. The highest score wins; equal scores go to the lowest model id.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::store::MetricsStore;
use super::types::{ColdStartDefaults, Domain, Model, ModelMetrics, ScoreWeights};
use crate::error::{Error, Result};

/// Latency at or below which the latency term is 1.0
pub const LATENCY_FLOOR_MS: f64 = 300.0;
/// Latency at or above which the latency term is 0.0
pub const LATENCY_CEILING_MS: f64 = 1500.0;

/// Map latency onto [0, 1], faster is better
pub fn normalize_latency(latency_ms: f64) -> f64 {
    let clamped = latency_ms.clamp(LATENCY_FLOOR_MS, LATENCY_CEILING_MS);
    (LATENCY_CEILING_MS - clamped) / (LATENCY_CEILING_MS - LATENCY_FLOOR_MS)
}

/// Weighted quality of a metrics row, before cost
pub fn quality_score(metrics: &ModelMetrics, weights: &ScoreWeights) -> f64 {
    weights.accuracy * metrics.accuracy_score
        + weights.fluency * metrics.fluency_score
        + weights.confidence * metrics.confidence
        + weights.latency * normalize_latency(metrics.latency_ms)
}

/// A candidate with its score breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredModel {
    pub model: Model,
    pub quality: f64,
    pub cost_factor: f64,
    /// `quality * cost_factor`
    pub score: f64,
    /// Whether cold-start defaults stood in for an unobserved pair
    pub cold_start: bool,
}

/// Score and sort candidates, best first
///
/// Pairs with no observations use `cold_start` values.
pub fn rank_candidates(
    models: Vec<Model>,
    domain_id: i64,
    rows: &HashMap<i64, ModelMetrics>,
    weights: &ScoreWeights,
    cold_start: &ColdStartDefaults,
) -> Vec<ScoredModel> {
    let mut ranked: Vec<ScoredModel> = models
        .into_iter()
        .map(|model| {
            let observed = rows
                .get(&model.id)
                .filter(|row| row.usage_count + row.failure_count > 0);
            let fallback;
            let metrics = match observed {
                Some(row) => row,
                None => {
                    fallback = ModelMetrics::cold_start(model.id, domain_id, cold_start);
                    &fallback
                }
            };

            let quality = quality_score(metrics, weights);
            let cost_factor = model.cost_factor();
            ScoredModel {
                quality,
                cost_factor,
                score: quality * cost_factor,
                cold_start: observed.is_none(),
                model,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.model.id.cmp(&b.model.id))
    });
    ranked
}

/// Ranks registered models for a domain using stored metrics
#[derive(Clone)]
pub struct ModelScorer {
    store: Arc<dyn MetricsStore>,
    cold_start: ColdStartDefaults,
}

impl ModelScorer {
    pub fn new(store: Arc<dyn MetricsStore>, cold_start: ColdStartDefaults) -> Self {
        Self { store, cold_start }
    }

    /// Every candidate for `domain`, best first
    pub async fn rank(&self, domain: &Domain, weights: &ScoreWeights) -> Result<Vec<ScoredModel>> {
        weights.validate()?;

        let models = self.store.list_models().await?;
        if models.is_empty() {
            return Err(Error::NoCandidates(domain.name.clone()));
        }
        let rows = self.store.domain_metrics(domain.id).await?;

        Ok(rank_candidates(
            models,
            domain.id,
            &rows,
            weights,
            &self.cold_start,
        ))
    }

    /// The single best candidate for `domain`
    pub async fn select_best_model(
        &self,
        domain: &Domain,
        weights: &ScoreWeights,
    ) -> Result<ScoredModel> {
        let best = self
            .rank(domain, weights)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NoCandidates(domain.name.clone()))?;

        debug!(
            domain = %domain.name,
            model_id = best.model.id,
            score = best.score,
            cold_start = best.cold_start,
            "Selected model"
        );
        Ok(best)
    }
}

impl std::fmt::Debug for ModelScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelScorer")
            .field("cold_start", &self.cold_start)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::types::ObservedMetrics;

    fn model(id: i64, cost: f64) -> Model {
        Model {
            id,
            name: format!("model-{}", id),
            provider: "test".to_string(),
            cost,
        }
    }

    fn row(model_id: i64, accuracy: f64, latency_ms: f64) -> ModelMetrics {
        ModelMetrics::first_observation(
            model_id,
            1,
            &ObservedMetrics {
                accuracy,
                fluency: 0.5,
                confidence: 0.5,
                latency_ms,
                tokens: 10,
            },
            true,
        )
    }

    #[test]
    fn test_latency_normalization_is_clamped() {
        assert_eq!(normalize_latency(200.0), 1.0);
        assert_eq!(normalize_latency(300.0), 1.0);
        assert_eq!(normalize_latency(1500.0), 0.0);
        assert_eq!(normalize_latency(2000.0), 0.0);

        let mid = normalize_latency(900.0);
        assert!(mid > 0.0 && mid < 1.0);
        assert!((mid - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_latency_normalization_is_monotonic() {
        let mut previous = normalize_latency(0.0);
        for ms in (0..2000).step_by(50) {
            let current = normalize_latency(ms as f64);
            assert!(current <= previous);
            previous = current;
        }
    }

    #[test]
    fn test_selects_maximum_quality_times_cost() {
        let weights = ScoreWeights::default();
        let mut rows = HashMap::new();
        rows.insert(1, row(1, 0.9, 400.0));
        rows.insert(2, row(2, 0.6, 400.0));
        rows.insert(3, row(3, 1.0, 400.0));

        // Model 3 has the best quality but costs 1.0, halving its score
        let ranked = rank_candidates(
            vec![model(1, 0.0), model(2, 0.0), model(3, 1.0)],
            1,
            &rows,
            &weights,
            &ColdStartDefaults::default(),
        );

        let best = ranked
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .unwrap();
        assert_eq!(ranked[0].model.id, best.model.id);
        assert_eq!(ranked[0].model.id, 1);
        for scored in &ranked {
            assert!((scored.score - scored.quality * scored.cost_factor).abs() < 1e-12);
        }
    }

    #[test]
    fn test_ties_go_to_lowest_id() {
        let ranked = rank_candidates(
            vec![model(9, 0.0), model(4, 0.0), model(7, 0.0)],
            1,
            &HashMap::new(),
            &ScoreWeights::default(),
            &ColdStartDefaults::default(),
        );
        let ids: Vec<i64> = ranked.iter().map(|s| s.model.id).collect();
        assert_eq!(ids, vec![4, 7, 9]);
        assert!(ranked.iter().all(|s| s.cold_start));
    }

    #[test]
    fn test_zero_cost_preferred_at_equal_quality() {
        let ranked = rank_candidates(
            vec![model(1, 1.0), model(2, 0.0)],
            1,
            &HashMap::new(),
            &ScoreWeights::default(),
            &ColdStartDefaults::default(),
        );
        assert_eq!(ranked[0].model.id, 2);
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn test_cold_start_score() {
        // 0.5*0.5 + 0.2*0.5 + 0.2*0.5 + 0.1*normalize(1000)
        let ranked = rank_candidates(
            vec![model(1, 0.0)],
            1,
            &HashMap::new(),
            &ScoreWeights::default(),
            &ColdStartDefaults::default(),
        );
        let expected = 0.25 + 0.1 + 0.1 + 0.1 * (500.0 / 1200.0);
        assert!((ranked[0].score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_zero_weights_fall_back_to_id_order() {
        let mut rows = HashMap::new();
        rows.insert(2, row(2, 1.0, 300.0));
        let ranked = rank_candidates(
            vec![model(2, 0.0), model(1, 0.0)],
            1,
            &rows,
            &ScoreWeights::new(0.0, 0.0, 0.0, 0.0),
            &ColdStartDefaults::default(),
        );
        assert_eq!(ranked[0].model.id, 1);
        assert_eq!(ranked[0].score, 0.0);
    }
}
