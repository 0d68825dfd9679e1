pub mod client;
pub mod draft;
pub mod explain;
pub mod help;
pub mod intent;
pub mod prompts;

use thiserror::Error;

/// LLM boundary errors. Advisory paths (explain, help) convert all of
/// these into deterministic fallbacks; intent parsing surfaces them
/// typed so the shell can ask the user to retry.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("llm disabled")]
    Disabled,

    #[error("llm unavailable: {0}")]
    Unavailable(String),

    #[error("llm timed out")]
    Timeout,

    #[error("llm output invalid: {0}")]
    InvalidOutput(String),

    #[error("llm retries exhausted")]
    RetryExhausted,

    #[error("cancelled")]
    Cancelled,
}

pub type LlmResult<T> = Result<T, LlmError>;

/// Whether a value came from the model or from the deterministic path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Llm,
    Deterministic,
}

/// A validated advisory value together with its provenance. The
/// deterministic variant always carries confidence 1.0.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Grounded<T> {
    pub value: T,
    pub source: Source,
    pub confidence: f64,
}

impl<T> Grounded<T> {
    pub fn llm(value: T, confidence: f64) -> Self {
        Self {
            value,
            source: Source::Llm,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn deterministic(value: T) -> Self {
        Self {
            value,
            source: Source::Deterministic,
            confidence: 1.0,
        }
    }
}
