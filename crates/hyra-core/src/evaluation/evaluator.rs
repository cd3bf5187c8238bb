//! Concurrent post-hoc evaluation
//!
//! Verification and fluency judging depend only on the generated text, so
//! they run side by side and are joined before metrics are updated. Each call
//! is bounded by a timeout; any failure degrades to a conservative default.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::judges::{FluencyJudge, VerificationJudge, Verdict};
use crate::error::{Error, Result};
use crate::routing::Domain;

/// Joined result of both judges
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub accuracy: f64,
    pub passed: bool,
    pub fluency: f64,
}

/// Runs the verifier and the fluency judge concurrently
#[derive(Clone)]
pub struct Evaluator {
    verifier: Arc<dyn VerificationJudge>,
    fluency: Arc<dyn FluencyJudge>,
    timeout: Duration,
}

impl Evaluator {
    pub fn new(
        verifier: Arc<dyn VerificationJudge>,
        fluency: Arc<dyn FluencyJudge>,
        timeout: Duration,
    ) -> Self {
        Self {
            verifier,
            fluency,
            timeout,
        }
    }

    /// Judge `output` as an answer to `prompt`
    ///
    /// Never fails: a verifier failure yields accuracy 0.0 and `passed = false`,
    /// a fluency failure yields 0.0.
    pub async fn evaluate(&self, domain: &Domain, prompt: &str, output: &str) -> Evaluation {
        let (verdict, fluency) = tokio::join!(
            bounded(
                "verification judge",
                self.timeout,
                self.verifier.verify(domain, prompt, output)
            ),
            bounded("fluency judge", self.timeout, self.fluency.fluency(output)),
        );

        let verdict = verdict.unwrap_or_else(|e| {
            warn!(error = %e, "Verification failed, treating answer as not passed");
            Verdict::FAILED
        });
        let fluency = fluency.map(|s| s.score.clamp(0.0, 1.0)).unwrap_or_else(|e| {
            warn!(error = %e, "Fluency judge failed, using 0.0");
            0.0
        });

        Evaluation {
            accuracy: verdict.accuracy.clamp(0.0, 1.0),
            passed: verdict.passed,
            fluency,
        }
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Await `fut` for at most `limit`, mapping expiry to [`Error::Timeout`]
pub(crate) async fn bounded<T>(
    what: &str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(what.to_string(), limit.as_secs())),
    }
}
