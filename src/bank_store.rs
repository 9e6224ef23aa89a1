use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{AnsweredRecord, Candidate, SubtopicAllowlist};

/// Error codes a bank backend reports for conditions worth retrying.
const TRANSIENT_CODES: &[&str] = &[
    "unavailable",
    "deadline-exceeded",
    "resource-exhausted",
    "failed-precondition",
    "aborted",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceErrorKind {
    /// Network or quota trouble; retried with backoff.
    Transient,
    /// The backing query needs an index (or table) that does not exist. Never retried.
    Index,
    Permanent,
}

impl fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceErrorKind::Transient => f.write_str("transient"),
            SourceErrorKind::Index => f.write_str("index"),
            SourceErrorKind::Permanent => f.write_str("permanent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind} bank error ({code}): {message}")]
pub struct BankError {
    pub kind: SourceErrorKind,
    pub code: String,
    pub message: String,
}

impl BankError {
    /// Classify a backend error from its code and message.
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = classify(code, &message);
        Self {
            kind,
            code: code.to_string(),
            message,
        }
    }

    pub fn transient(code: &str, message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Transient,
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn missing_index(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Index,
            code: "failed-precondition".to_string(),
            message: message.into(),
        }
    }

    pub fn permanent(code: &str, message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Permanent,
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == SourceErrorKind::Transient
    }
}

fn classify(code: &str, message: &str) -> SourceErrorKind {
    let lowered = message.to_lowercase();
    if lowered.contains("requires an index")
        || lowered.contains("missing index")
        || lowered.contains("no such index")
        || lowered.contains("no such table")
    {
        return SourceErrorKind::Index;
    }

    let code = code.to_lowercase().replace('_', "-");
    if TRANSIENT_CODES.contains(&code.as_str()) {
        SourceErrorKind::Transient
    } else {
        SourceErrorKind::Permanent
    }
}

/// One remote question collection (class, personal or shared).
///
/// `owner` is the class id for class banks, the user id for personal banks and
/// `None` for the shared bank.
#[async_trait]
pub trait BankStore: Send + Sync {
    async fn query(&self, owner: Option<&str>, topic: &str, grade: u8) -> Result<Vec<Candidate>, BankError>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn load_answered_history(&self, user_id: &str) -> Result<Vec<AnsweredRecord>>;

    async fn load_answered_bank_ids(&self, user_id: &str) -> Result<Vec<String>>;
}

#[async_trait]
pub trait EnrollmentService: Send + Sync {
    async fn subtopic_allowlist_for(&self, user_id: &str) -> Result<SubtopicAllowlist>;

    /// `None` when the class has no configured probability.
    async fn bank_sample_probability_for(&self, class_id: &str) -> Result<Option<f64>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_codes_are_retryable() {
        for code in ["unavailable", "deadline-exceeded", "RESOURCE_EXHAUSTED", "failed-precondition"] {
            let err = BankError::from_code(code, "backend hiccup");
            assert_eq!(err.kind, SourceErrorKind::Transient, "code {}", code);
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn test_index_message_wins_over_transient_code() {
        let err = BankError::from_code("failed-precondition", "The query requires an index. Create it here");
        assert_eq!(err.kind, SourceErrorKind::Index);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unknown_code_is_permanent() {
        let err = BankError::from_code("permission-denied", "nope");
        assert_eq!(err.kind, SourceErrorKind::Permanent);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&SourceErrorKind::Index).unwrap(), "\"index\"");
        assert_eq!(SourceErrorKind::Transient.to_string(), "transient");
    }
}
