//! Stage observers
//!
//! The router reports each pipeline stage to an injected [`RouteObserver`].
//! Observers only watch: the pipeline behaves identically with or without one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Stages of a routed request, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStage {
    Classify,
    SelectModel,
    Dispatch,
    Evaluate,
    UpdateMetrics,
    Respond,
}

impl RouteStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classify => "classify",
            Self::SelectModel => "select_model",
            Self::Dispatch => "dispatch",
            Self::Evaluate => "evaluate",
            Self::UpdateMetrics => "update_metrics",
            Self::Respond => "respond",
        }
    }
}

impl std::fmt::Display for RouteStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives span-like start/finish events for each stage
pub trait RouteObserver: Send + Sync {
    fn stage_started(&self, request_id: Uuid, stage: RouteStage, input: &Value);
    fn stage_finished(&self, request_id: Uuid, stage: RouteStage, output: &Value);
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RouteObserver for NoopObserver {
    fn stage_started(&self, _request_id: Uuid, _stage: RouteStage, _input: &Value) {}
    fn stage_finished(&self, _request_id: Uuid, _stage: RouteStage, _output: &Value) {}
}

/// Observer that emits `tracing` events under the `hyra::trace` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RouteObserver for TracingObserver {
    fn stage_started(&self, request_id: Uuid, stage: RouteStage, input: &Value) {
        tracing::debug!(
            target: "hyra::trace",
            request_id = %request_id,
            stage = stage.as_str(),
            input = %input,
            "stage started"
        );
    }

    fn stage_finished(&self, request_id: Uuid, stage: RouteStage, output: &Value) {
        tracing::info!(
            target: "hyra::trace",
            request_id = %request_id,
            stage = stage.as_str(),
            output = %output,
            "stage finished"
        );
    }
}
