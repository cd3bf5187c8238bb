//! Persistent storage for routing reference data and metrics
//!
//! The router reads and writes through the [`MetricsStore`] trait; the SQLite
//! implementation persists domains, models and one metrics row per
//! (model, domain) pair so that learning survives restarts.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use super::types::{Domain, Model, ModelMetrics};
use crate::error::{Error, Result};

/// Maps a pair's current row (if any) to its next value
pub type MetricsTransition = Box<dyn FnOnce(Option<ModelMetrics>) -> ModelMetrics + Send>;

/// Typed access to domains, models and their metrics rows
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// All domains, ordered by id
    async fn list_domains(&self) -> Result<Vec<Domain>>;

    /// Look up a domain by its exact name
    async fn find_domain(&self, name: &str) -> Result<Option<Domain>>;

    /// All candidate models, ordered by id
    async fn list_models(&self) -> Result<Vec<Model>>;

    /// A single model by id
    async fn get_model(&self, model_id: i64) -> Result<Model>;

    /// Register a new candidate model
    async fn add_model(&self, name: &str, provider: &str, cost: f64) -> Result<Model>;

    /// Metrics rows for a domain, keyed by model id
    async fn domain_metrics(&self, domain_id: i64) -> Result<HashMap<i64, ModelMetrics>>;

    /// The metrics row for one pair, if it has been observed
    async fn get_metrics(&self, model_id: i64, domain_id: i64) -> Result<Option<ModelMetrics>>;

    /// Read the pair's row, apply `transition` and write the result back as
    /// one atomic step
    ///
    /// Implementations must exclude every other writer of the same store for
    /// the duration, including writers in other processes.
    async fn apply_metrics(
        &self,
        model_id: i64,
        domain_id: i64,
        transition: MetricsTransition,
    ) -> Result<ModelMetrics>;
}

/// SQLite-backed [`MetricsStore`]
#[derive(Debug, Clone)]
pub struct SqliteMetricsStore {
    pool: SqlitePool,
}

impl SqliteMetricsStore {
    /// Create a new store from an existing (migrated) connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn domain_from_row(row: &SqliteRow) -> Result<Domain> {
    Ok(Domain {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        subjective: row.try_get::<i64, _>("subjective")? != 0,
    })
}

fn model_from_row(row: &SqliteRow) -> Result<Model> {
    Ok(Model {
        id: row.try_get("id")?,
        name: row.try_get("model_name")?,
        provider: row.try_get("provider")?,
        cost: row.try_get("cost")?,
    })
}

fn metrics_from_row(row: &SqliteRow) -> Result<ModelMetrics> {
    Ok(ModelMetrics {
        model_id: row.try_get("model_id")?,
        domain_id: row.try_get("domain_id")?,
        accuracy_score: row.try_get("accuracy_score")?,
        fluency_score: row.try_get("fluency_score")?,
        confidence: row.try_get("confidence")?,
        latency_ms: row.try_get("latency_ms")?,
        tokens_per_query: row.try_get("tokens_per_query")?,
        usage_count: row.try_get::<i64, _>("usage_count")?.max(0) as u64,
        failure_count: row.try_get::<i64, _>("failure_count")?.max(0) as u64,
        last_updated: row.try_get::<DateTime<Utc>, _>("last_updated")?,
    })
}

const METRICS_COLUMNS: &str = "model_id, domain_id, accuracy_score, fluency_score, confidence, \
     latency_ms, tokens_per_query, usage_count, failure_count, last_updated";

#[async_trait]
impl MetricsStore for SqliteMetricsStore {
    async fn list_domains(&self) -> Result<Vec<Domain>> {
        let rows = sqlx::query("SELECT id, name, subjective FROM domains ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(domain_from_row).collect()
    }

    async fn find_domain(&self, name: &str) -> Result<Option<Domain>> {
        let row = sqlx::query("SELECT id, name, subjective FROM domains WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(domain_from_row).transpose()
    }

    async fn list_models(&self) -> Result<Vec<Model>> {
        let rows = sqlx::query("SELECT id, model_name, provider, cost FROM models ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(model_from_row).collect()
    }

    async fn get_model(&self, model_id: i64) -> Result<Model> {
        let row = sqlx::query("SELECT id, model_name, provider, cost FROM models WHERE id = ?")
            .bind(model_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => model_from_row(&row),
            None => Err(Error::ModelNotFound(model_id)),
        }
    }

    async fn add_model(&self, name: &str, provider: &str, cost: f64) -> Result<Model> {
        if !cost.is_finite() || cost < 0.0 {
            return Err(Error::ConfigError(format!(
                "Model cost must be a non-negative number, got {}",
                cost
            )));
        }

        let result = sqlx::query("INSERT INTO models (model_name, provider, cost) VALUES (?, ?, ?)")
            .bind(name)
            .bind(provider)
            .bind(cost)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                let duplicate = e
                    .as_database_error()
                    .is_some_and(|db| db.is_unique_violation());
                if duplicate {
                    Error::ConfigError(format!(
                        "Model {}/{} is already registered",
                        provider, name
                    ))
                } else {
                    Error::DatabaseError(e)
                }
            })?;

        let model = Model {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            provider: provider.to_string(),
            cost,
        };
        info!(model_id = model.id, model = %model.backend_identifier(), "Registered model");
        Ok(model)
    }

    async fn domain_metrics(&self, domain_id: i64) -> Result<HashMap<i64, ModelMetrics>> {
        let sql = format!(
            "SELECT {} FROM model_metrics WHERE domain_id = ?",
            METRICS_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(domain_id)
            .fetch_all(&self.pool)
            .await?;

        let mut result = HashMap::with_capacity(rows.len());
        for row in &rows {
            let metrics = metrics_from_row(row)?;
            result.insert(metrics.model_id, metrics);
        }

        debug!(domain_id = domain_id, count = result.len(), "Loaded domain metrics");
        Ok(result)
    }

    async fn get_metrics(&self, model_id: i64, domain_id: i64) -> Result<Option<ModelMetrics>> {
        let mut conn = self.pool.acquire().await?;
        select_metrics(&mut *conn, model_id, domain_id).await
    }

    async fn apply_metrics(
        &self,
        model_id: i64,
        domain_id: i64,
        transition: MetricsTransition,
    ) -> Result<ModelMetrics> {
        let mut tx = self.pool.begin().await?;

        // Take the write lock before reading so another connection (or
        // process) cannot read the same row in between.
        sqlx::query(
            "UPDATE model_metrics SET usage_count = usage_count \
             WHERE model_id = ? AND domain_id = ?",
        )
        .bind(model_id)
        .bind(domain_id)
        .execute(&mut *tx)
        .await?;

        let current = select_metrics(&mut *tx, model_id, domain_id).await?;
        let next = transition(current);
        upsert_metrics(&mut *tx, &next).await?;

        tx.commit().await?;

        debug!(
            model_id = next.model_id,
            domain_id = next.domain_id,
            usage_count = next.usage_count,
            failure_count = next.failure_count,
            "Saved model metrics"
        );
        Ok(next)
    }
}

async fn select_metrics(
    conn: &mut SqliteConnection,
    model_id: i64,
    domain_id: i64,
) -> Result<Option<ModelMetrics>> {
    let sql = format!(
        "SELECT {} FROM model_metrics WHERE model_id = ? AND domain_id = ?",
        METRICS_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(model_id)
        .bind(domain_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(metrics_from_row).transpose()
}

async fn upsert_metrics(conn: &mut SqliteConnection, metrics: &ModelMetrics) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO model_metrics (
            model_id, domain_id, accuracy_score, fluency_score, confidence,
            latency_ms, tokens_per_query, usage_count, failure_count, last_updated
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(model_id, domain_id) DO UPDATE SET
            accuracy_score = excluded.accuracy_score,
            fluency_score = excluded.fluency_score,
            confidence = excluded.confidence,
            latency_ms = excluded.latency_ms,
            tokens_per_query = excluded.tokens_per_query,
            usage_count = excluded.usage_count,
            failure_count = excluded.failure_count,
            last_updated = excluded.last_updated
        "#,
    )
    .bind(metrics.model_id)
    .bind(metrics.domain_id)
    .bind(metrics.accuracy_score)
    .bind(metrics.fluency_score)
    .bind(metrics.confidence)
    .bind(metrics.latency_ms)
    .bind(metrics.tokens_per_query)
    .bind(metrics.usage_count as i64)
    .bind(metrics.failure_count as i64)
    .bind(metrics.last_updated)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
