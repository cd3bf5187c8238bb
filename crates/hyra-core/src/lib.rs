//! Hyra Core Library
//!
//! This crate provides the core functionality for Hyra, an adaptive LLM router:
//! - Domain classification with a bounded LRU cache
//! - Multi-objective, cost-aware model scoring
//! - Inference dispatch with log-probability confidence
//! - Concurrent verification and fluency judging
//! - Reward/penalty learning persisted in SQLite
//! - Offline benchmarking against a labelled evaluation set

pub mod benchmark;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod inference;
pub mod llm;
pub mod routing;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::routing::{Router, RouterBuilder, RoutingResult};
}
