//! Run status enumeration reported by target algorithms.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::StatusParseError;

/// Outcome category of a single target algorithm run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// The run finished and reported a result. `SAT` and `UNSAT` map here.
    Success,
    /// The run exceeded its cutoff time.
    Timeout,
    /// The run exceeded its memory limit.
    Memout,
    /// This run failed. The optimizer records it and carries on.
    Crashed,
    /// Unrecoverable condition: the optimizer must stop issuing runs.
    Abort,
}

impl RunStatus {
    pub const ACCEPTED_WORDS: &'static str = "SAT, UNSAT, SUCCESS, TIMEOUT, MEMOUT, CRASHED, ABORT";

    /// Parse a status word as printed by a target algorithm, normalizing
    /// legacy synonyms.
    pub fn parse(word: &str) -> Result<Self, StatusParseError> {
        let trimmed = word.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            // SAT/UNSAT are kept for older SAT-solver wrappers.
            "SAT" | "UNSAT" | "SUCCESS" => Ok(Self::Success),
            "TIMEOUT" => Ok(Self::Timeout),
            "MEMOUT" => Ok(Self::Memout),
            "CRASHED" => Ok(Self::Crashed),
            "ABORT" => Ok(Self::Abort),
            _ => Err(StatusParseError::new(trimmed)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Timeout => "TIMEOUT",
            Self::Memout => "MEMOUT",
            Self::Crashed => "CRASHED",
            Self::Abort => "ABORT",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Only `Abort` stops the whole evaluation session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Abort)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_synonyms_normalize_to_success() {
        assert_eq!(RunStatus::parse("SAT").unwrap(), RunStatus::Success);
        assert_eq!(RunStatus::parse("UNSAT").unwrap(), RunStatus::Success);
    }

    #[test]
    fn canonical_words_are_unchanged() {
        for status in [
            RunStatus::Success,
            RunStatus::Timeout,
            RunStatus::Memout,
            RunStatus::Crashed,
            RunStatus::Abort,
        ] {
            assert_eq!(RunStatus::parse(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn parse_ignores_case_and_whitespace() {
        assert_eq!(" timeout ".parse::<RunStatus>().unwrap(), RunStatus::Timeout);
        assert_eq!("Sat".parse::<RunStatus>().unwrap(), RunStatus::Success);
    }

    #[test]
    fn unknown_word_is_an_error() {
        let err = RunStatus::parse("MAYBE").unwrap_err();
        assert_eq!(err.word, "MAYBE");
    }

    #[test]
    fn only_abort_is_fatal() {
        assert!(RunStatus::Abort.is_fatal());
        assert!(!RunStatus::Crashed.is_fatal());
        assert!(!RunStatus::Timeout.is_fatal());
    }

    #[test]
    fn serializes_as_canonical_word() {
        assert_eq!(serde_json::to_string(&RunStatus::Memout).unwrap(), "\"MEMOUT\"");
        let back: RunStatus = serde_json::from_str("\"CRASHED\"").unwrap();
        assert_eq!(back, RunStatus::Crashed);
    }
}
