//! The intelligent backend contract.
//!
//! Extraction and synthesis ask one question at a time: given some text
//! and an instruction, return a value and the reasoning behind it. Any
//! model, service or test double can sit behind [`IntelligentBackend`].
//!
//! A missing backend is modelled as [`NullBackend`], chosen when the
//! engines are built, rather than as a runtime check.

mod llm;

pub use llm::LlmBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// An answer from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendAnswer {
    pub value: String,
    pub rationale: String,
    /// Verbatim passage from the source that supports the value, if quoted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

impl BackendAnswer {
    pub fn new(value: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            rationale: rationale.into(),
            evidence: None,
        }
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }
}

/// Errors from a backend call. All of them are recovered locally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// No backend was configured. A form of unavailability that does not
    /// count against the circuit breaker.
    #[error("No intelligent backend configured")]
    NotConfigured,

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered, but not in a form that could be read.
    #[error("Malformed backend answer: {0}")]
    Malformed(String),
}

/// Anything that can answer an extraction or phrasing question.
#[async_trait]
pub trait IntelligentBackend: Send + Sync {
    /// Ask one question about `text`.
    async fn ask(&self, text: &str, instruction: &str) -> Result<BackendAnswer, BackendError>;

    /// Backend name for logs.
    fn name(&self) -> &str;
}

/// The backend used when none is configured. Every call is `NotConfigured`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend;

#[async_trait]
impl IntelligentBackend for NullBackend {
    async fn ask(&self, _text: &str, _instruction: &str) -> Result<BackendAnswer, BackendError> {
        Err(BackendError::NotConfigured)
    }

    fn name(&self) -> &str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_backend_is_not_configured() {
        let result = NullBackend.ask("text", "instruction").await;
        assert_eq!(result, Err(BackendError::NotConfigured));
        assert_eq!(NullBackend.name(), "none");
    }

    #[test]
    fn test_answer_serialization_skips_missing_evidence() {
        let answer = BackendAnswer::new("12 weeks", "stated in the schedule section");
        let json = serde_json::to_value(&answer).unwrap();
        assert!(json.get("evidence").is_none());
    }
}
