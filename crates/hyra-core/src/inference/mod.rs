//! Inference dispatch
//!
//! - `backend`: the [`InferenceBackend`] seam and the vLLM-style completion client
//! - `dispatcher`: timeout, latency measurement and confidence scoring

mod backend;
mod dispatcher;

pub use backend::{BackendCompletion, CompletionClient, InferenceBackend};
pub use dispatcher::{Dispatcher, InferenceOutcome, compute_confidence};
