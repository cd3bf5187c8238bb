//! Error types for Hyra

use thiserror::Error;

/// Result type alias using Hyra's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Hyra error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Reference data errors (E001-E099)
    #[error("Unknown domain '{0}'. Run `hyra domains list` to see the configured domains.")]
    UnknownDomain(String),

    #[error("Model {0} not found. Run `hyra models list` to see registered models.")]
    ModelNotFound(i64),

    // Network errors (E100-E199)
    #[error("Network error: {0}. Check that the endpoint is reachable.")]
    NetworkError(#[from] reqwest::Error),

    #[error("LLM API error: {0}")]
    LLMError(String),

    #[error("Judge returned malformed output: {0}")]
    JudgeError(String),

    #[error("Call to {0} timed out after {1} seconds")]
    Timeout(String, u64),

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid score weights: {0}")]
    InvalidWeights(String),

    // Benchmark errors (E700-E799)
    #[error("Invalid evaluation set: {0}")]
    EvalSetError(String),

    // Routing errors (E1100-E1199)
    #[error("No candidate models for domain '{0}'. Register one with `hyra models add`.")]
    NoCandidates(String),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownDomain(_) => "E001",
            Self::ModelNotFound(_) => "E002",
            Self::NetworkError(_) => "E100",
            Self::LLMError(_) => "E101",
            Self::JudgeError(_) => "E102",
            Self::Timeout(..) => "E103",
            Self::DatabaseError(_) => "E400",
            Self::ConfigError(_) => "E600",
            Self::InvalidWeights(_) => "E601",
            Self::NoCandidates(_) => "E1101",
            Self::EvalSetError(_) => "E700",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::UnknownDomain(_) => Some("hyra domains list".to_string()),
            Self::ModelNotFound(_) => Some("hyra models list".to_string()),
            Self::NetworkError(_) => Some("Check the inference and judge base URLs".to_string()),
            Self::InvalidWeights(_) => Some("hyra config list".to_string()),
            Self::EvalSetError(_) => Some(
                "Expected a JSON array of {\"domain\", \"q\", \"a\"} objects".to_string(),
            ),
            Self::NoCandidates(_) => {
                Some("hyra models add <name> --provider <provider> --cost <cost>".to_string())
            }
            _ => None,
        }
    }

    /// Whether this error ends the current request
    ///
    /// Oracle and backend failures are absorbed by the router with default
    /// values; everything else is reported to the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::NetworkError(_) | Self::LLMError(_) | Self::JudgeError(_) | Self::Timeout(..)
        )
    }
}
