//! Offline benchmarking against a labelled evaluation set
//!
//! Every registered model answers every question in the set. Each answer is
//! graded against the expected answer (or for plausibility, in subjective
//! domains) and for fluency, and the observation is folded into the same
//! (model, domain) metrics rows the router learns from. A benchmark run is
//! therefore a way to warm up the router before it sees live traffic.

mod eval_set;
mod runner;

pub use eval_set::{EvalItem, EvalSet};
pub use runner::{Benchmark, BenchmarkRecord, BenchmarkReport, ModelSummary};
