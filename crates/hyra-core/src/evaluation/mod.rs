//! Post-hoc evaluation of generated answers
//!
//! - `judges`: oracle contracts, LLM-backed judges, reference verification
//! - `evaluator`: concurrent verification + fluency with timeouts and defaults
//! - `prompts`: judge prompt templates

mod evaluator;
mod judges;
pub mod prompts;

pub(crate) use evaluator::bounded;
pub use evaluator::{Evaluation, Evaluator};
pub use judges::{
    AccuracyJudge, FluencyJudge, JudgeScore, LlmAccuracyJudge, LlmFluencyJudge, LlmVerifier,
    ReferenceVerifier, VerificationJudge, Verdict, parse_judge_json, passed_field, score_field,
};
