//! Quality judges
//!
//! The router consumes three oracle contracts: a verifier (accuracy plus a
//! pass/fail gate), a fluency judge and an accuracy judge. The LLM-backed
//! implementations parse the judge's reply leniently, since models often wrap
//! JSON in markdown fences or add chatter around it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::prompts;
use crate::error::{Error, Result};
use crate::llm::TextGenerator;
use crate::routing::Domain;

/// Verifier output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Accuracy in [0, 1]
    pub accuracy: f64,
    /// Binary gate for the reward/penalty update
    pub passed: bool,
}

impl Verdict {
    /// Value used when the verifier fails
    pub const FAILED: Verdict = Verdict {
        accuracy: 0.0,
        passed: false,
    };
}

/// Score with the judge's justification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeScore {
    /// Score in [0, 1]
    pub score: f64,
    #[serde(default)]
    pub reason: String,
}

/// Decides whether an answer passes and how accurate it is
#[async_trait]
pub trait VerificationJudge: Send + Sync {
    async fn verify(&self, domain: &Domain, prompt: &str, output: &str) -> Result<Verdict>;
}

/// Rates readability independent of correctness
#[async_trait]
pub trait FluencyJudge: Send + Sync {
    async fn fluency(&self, output: &str) -> Result<JudgeScore>;
}

/// Scores an answer against an optional reference answer
///
/// With `expected = None` the judge scores plausibility instead, which is
/// how subjective domains are graded.
#[async_trait]
pub trait AccuracyJudge: Send + Sync {
    async fn accuracy(&self, prompt: &str, expected: Option<&str>, output: &str)
    -> Result<JudgeScore>;
}

/// Extract the first JSON object from a judge reply
pub fn parse_judge_json(raw: &str) -> Result<Value> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    let start = cleaned.find('{');
    let end = cleaned.rfind('}');

    let candidate = match (start, end) {
        (Some(start), Some(end)) if start < end => &cleaned[start..=end],
        _ => {
            return Err(Error::JudgeError(format!(
                "no JSON object in judge reply: {}",
                truncate(raw, 120)
            )));
        }
    };

    serde_json::from_str(candidate)
        .map_err(|e| Error::JudgeError(format!("invalid judge JSON ({}): {}", e, truncate(raw, 120))))
}

/// Read a numeric score (number or numeric string), clamped to [0, 1]
pub fn score_field(value: &Value, key: &str) -> Result<f64> {
    let score = match value.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match score {
        Some(s) if s.is_finite() => Ok(s.clamp(0.0, 1.0)),
        _ => Err(Error::JudgeError(format!("missing or non-numeric '{}'", key))),
    }
}

/// Read a pass flag given as a bool or as the string "true"/"false"
pub fn passed_field(value: &Value) -> bool {
    match value.get("passed") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn parse_score(raw: &str) -> Result<JudgeScore> {
    let value = parse_judge_json(raw)?;
    Ok(JudgeScore {
        score: score_field(&value, "score")?,
        reason: value
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

/// Single-call verifier over a text generator
pub struct LlmVerifier {
    generator: Arc<dyn TextGenerator>,
}

impl LlmVerifier {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl VerificationJudge for LlmVerifier {
    async fn verify(&self, domain: &Domain, prompt: &str, output: &str) -> Result<Verdict> {
        let judge_prompt = if domain.subjective {
            prompts::subjective_verifier_prompt(prompt, output)
        } else {
            prompts::verifier_prompt(prompt, output)
        };
        let raw = self.generator.generate(&judge_prompt).await?;
        let value = parse_judge_json(&raw)?;
        let verdict = Verdict {
            accuracy: score_field(&value, "accuracy")?,
            passed: passed_field(&value),
        };
        debug!(accuracy = verdict.accuracy, passed = verdict.passed, "Verifier verdict");
        Ok(verdict)
    }
}

/// Fluency judge over a text generator
pub struct LlmFluencyJudge {
    generator: Arc<dyn TextGenerator>,
}

impl LlmFluencyJudge {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl FluencyJudge for LlmFluencyJudge {
    async fn fluency(&self, output: &str) -> Result<JudgeScore> {
        let raw = self.generator.generate(&prompts::fluency_prompt(output)).await?;
        parse_score(&raw)
    }
}

/// Accuracy judge over a text generator
pub struct LlmAccuracyJudge {
    generator: Arc<dyn TextGenerator>,
}

impl LlmAccuracyJudge {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl AccuracyJudge for LlmAccuracyJudge {
    async fn accuracy(
        &self,
        prompt: &str,
        expected: Option<&str>,
        output: &str,
    ) -> Result<JudgeScore> {
        let judge_prompt = match expected {
            Some(expected) => prompts::accuracy_prompt(prompt, expected, output),
            None => prompts::subjective_accuracy_prompt(prompt, output),
        };
        let raw = self.generator.generate(&judge_prompt).await?;
        parse_score(&raw)
    }
}

/// Verifier that grades against a freshly generated reference answer
///
/// Objective domains get a reference answer from `reference` and are graded
/// by the accuracy judge against it; subjective domains skip the reference
/// and are graded for plausibility. The answer passes when the score reaches
/// `pass_threshold`.
pub struct ReferenceVerifier {
    reference: Arc<dyn TextGenerator>,
    judge: Arc<dyn AccuracyJudge>,
    pass_threshold: f64,
}

impl ReferenceVerifier {
    pub fn new(
        reference: Arc<dyn TextGenerator>,
        judge: Arc<dyn AccuracyJudge>,
        pass_threshold: f64,
    ) -> Self {
        Self {
            reference,
            judge,
            pass_threshold: pass_threshold.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl VerificationJudge for ReferenceVerifier {
    async fn verify(&self, domain: &Domain, prompt: &str, output: &str) -> Result<Verdict> {
        let expected = if domain.subjective {
            None
        } else {
            Some(self.reference.generate(prompt).await?)
        };

        let score = self
            .judge
            .accuracy(prompt, expected.as_deref(), output)
            .await?;

        Ok(Verdict {
            accuracy: score.score,
            passed: score.score >= self.pass_threshold,
        })
    }
}
