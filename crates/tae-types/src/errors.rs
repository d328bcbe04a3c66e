use thiserror::Error;

use crate::status::RunStatus;

/// Main error type for target algorithm evaluation.
///
/// A target algorithm that crashes, times out or runs out of memory is not an
/// error at this level: those outcomes are reported through [`RunStatus`].
/// `TaeError` covers misuse of the evaluator and conditions that end the whole
/// evaluation session.
#[derive(Error, Debug)]
pub enum TaeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("Status parse error: {0}")]
    StatusParse(#[from] StatusParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Target algorithm aborted the session: {reason}")]
    Aborted { reason: String },

    #[error("First run of the target algorithm crashed: {reason}")]
    FirstRunCrashed { reason: String },

    #[error("Evaluation session halted after an earlier abort")]
    Halted,

    #[error("Target algorithm run limit of {limit} reached")]
    BudgetExhausted { limit: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TaeError {
    /// Whether this error ends the evaluation session for good.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TaeError::Aborted { .. } | TaeError::FirstRunCrashed { .. } | TaeError::Halted
        )
    }
}

/// Error raised when a status word is not part of the status enumeration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown run status '{word}', expected one of {expected}")]
pub struct StatusParseError {
    pub word: String,
    pub expected: &'static str,
}

impl StatusParseError {
    pub fn new(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            expected: RunStatus::ACCEPTED_WORDS,
        }
    }
}

/// Result type alias for evaluator operations
pub type TaeResult<T> = Result<T, TaeError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::TaeError::Config(format!($($arg)*))
    };
}

/// Macro for creating invalid-configuration errors
#[macro_export]
macro_rules! invalid_configuration {
    ($($arg:tt)*) => {
        $crate::TaeError::InvalidConfiguration { message: format!($($arg)*) }
    };
}
