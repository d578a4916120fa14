//! Extraction engine: one value per schema field.
//!
//! Each field walks the same chain until something produces a value:
//!
//! 1. ask the backend, with the field's question and constraints
//! 2. on a rejected or timed-out answer, ask once more with a stricter
//!    instruction (up to `max_retries` times)
//! 3. try the field's deterministic patterns
//! 4. use the declared or kind default
//!
//! Steps 1 and 2 are skipped when the backend is unavailable, not
//! configured, or its extraction circuit is open. The chain never fails,
//! so a schema of N fields always yields N values.
//!
//! # Isolation Contract
//!
//! Fields are extracted concurrently and independently. A field's outcome
//! depends only on the document, its own field definition and the backend's
//! answers to its own questions. The one shared piece of state is the
//! extraction circuit breaker: repeated backend failures on some fields can
//! open it, and later fields then skip straight to patterns and defaults.

use crate::backend::{BackendAnswer, BackendError, IntelligentBackend, NullBackend};
use crate::config::ExtractionConfig;
use crate::evidence::EvidenceValidator;
use crate::prompts;
use crate::resilience::{BackendStage, CircuitBreaker};
use distill_core::fallback::{self, FallbackExtractor, RegexFallback};
use distill_core::{
    check_document, ExtractedValue, ExtractedValues, ExtractionError, FieldSchema, FieldSpec,
    FieldValue, ValueSource,
};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;

/// Counts of how a document's fields were resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionSummary {
    pub total: usize,
    pub ai: usize,
    pub fallback: usize,
    /// Fields that needed a retry, a pattern or a default
    pub degraded: Vec<String>,
    pub backend_calls: u32,
}

impl ExtractionSummary {
    pub fn of(values: &ExtractedValues) -> Self {
        let mut summary = Self {
            total: values.len(),
            ..Default::default()
        };
        for (name, value) in values {
            match value.source() {
                ValueSource::Ai => summary.ai += 1,
                ValueSource::Fallback => summary.fallback += 1,
            }
            if value.is_degraded() {
                summary.degraded.push(name.clone());
            }
            summary.backend_calls += value.attempts();
        }
        summary
    }
}

pub struct ExtractionEngine {
    backend: Arc<dyn IntelligentBackend>,
    fallback: Arc<dyn FallbackExtractor>,
    breaker: Arc<CircuitBreaker>,
    config: ExtractionConfig,
}

impl ExtractionEngine {
    pub fn new(backend: Arc<dyn IntelligentBackend>) -> Self {
        Self {
            backend,
            fallback: Arc::new(RegexFallback),
            breaker: Arc::new(CircuitBreaker::default()),
            config: ExtractionConfig::default(),
        }
    }

    /// Engine with no backend: patterns and defaults only.
    pub fn deterministic() -> Self {
        Self::new(Arc::new(NullBackend))
    }

    pub fn with_config(mut self, config: ExtractionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackExtractor>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Share a breaker with other engines or requests.
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract every field of `schema` from `document_text`.
    ///
    /// Fails only for empty input. Every field resolves to a value.
    pub async fn extract(
        &self,
        document_text: &str,
        schema: &FieldSchema,
    ) -> Result<ExtractedValues, ExtractionError> {
        check_document(document_text)?;

        let evidence = EvidenceValidator::new(document_text);
        let limit = self.config.max_concurrency.max(1);

        let values: Vec<ExtractedValue> = stream::iter(schema.fields())
            .map(|spec| self.extract_field(document_text, spec, &evidence))
            .buffered(limit)
            .collect()
            .await;

        let values: ExtractedValues = values
            .into_iter()
            .map(|v| (v.field().to_string(), v))
            .collect();

        let summary = ExtractionSummary::of(&values);
        if summary.degraded.is_empty() {
            tracing::info!(
                backend = %self.backend.name(),
                fields = summary.total,
                ai = summary.ai,
                backend_calls = summary.backend_calls,
                "Extraction complete"
            );
        } else {
            tracing::warn!(
                backend = %self.backend.name(),
                fields = summary.total,
                ai = summary.ai,
                fallback = summary.fallback,
                degraded = ?summary.degraded,
                "Extraction complete with degraded fields"
            );
        }

        Ok(values)
    }

    async fn extract_field(
        &self,
        text: &str,
        spec: &FieldSpec,
        evidence: &EvidenceValidator,
    ) -> ExtractedValue {
        let mut warnings = Vec::new();
        let mut attempts = 0u32;
        let mut rejection: Option<String> = None;
        let max_attempts = 1 + self.config.max_retries;

        while attempts < max_attempts {
            if self.breaker.is_open(BackendStage::Extraction) {
                warnings.push("extraction circuit open; backend skipped".to_string());
                break;
            }

            let instruction = prompts::field_instruction(spec, rejection.as_deref());
            attempts += 1;

            let outcome =
                tokio::time::timeout(self.config.call_timeout, self.backend.ask(text, &instruction))
                    .await;

            match outcome {
                Ok(Ok(answer)) => {
                    self.breaker.record_success(BackendStage::Extraction);
                    match accept(spec, &answer, evidence) {
                        Ok(value) => {
                            tracing::debug!(field = %spec.name, attempts = attempts, "Backend value accepted");
                            return ExtractedValue::from_backend(
                                &spec.name,
                                value,
                                answer.rationale,
                                attempts,
                                warnings,
                            );
                        }
                        Err(reason) => {
                            tracing::warn!(field = %spec.name, attempt = attempts, reason = %reason, "Backend value rejected");
                            warnings.push(format!("attempt {}: answer rejected: {}", attempts, reason));
                            rejection = Some(reason);
                        }
                    }
                }
                Ok(Err(BackendError::NotConfigured)) => {
                    // Nothing was called
                    attempts -= 1;
                    warnings.push("no intelligent backend configured".to_string());
                    break;
                }
                Ok(Err(BackendError::Unavailable(reason))) => {
                    self.breaker.record_failure(BackendStage::Extraction);
                    tracing::warn!(field = %spec.name, reason = %reason, "Backend unavailable");
                    warnings.push(format!("attempt {}: backend unavailable: {}", attempts, reason));
                    break;
                }
                Ok(Err(BackendError::Malformed(reason))) => {
                    tracing::warn!(field = %spec.name, attempt = attempts, reason = %reason, "Malformed backend answer");
                    warnings.push(format!("attempt {}: malformed answer: {}", attempts, reason));
                    rejection = Some(format!("the answer was not the requested JSON object ({})", reason));
                }
                Ok(Err(BackendError::Timeout(after))) => {
                    self.record_timeout(spec, attempts, after, &mut warnings);
                    rejection = Some("the previous request timed out; answer briefly".to_string());
                }
                Err(_) => {
                    self.record_timeout(spec, attempts, self.config.call_timeout, &mut warnings);
                    rejection = Some("the previous request timed out; answer briefly".to_string());
                }
            }
        }

        fallback::resolve(text, spec, self.fallback.as_ref(), warnings, attempts)
    }

    fn record_timeout(
        &self,
        spec: &FieldSpec,
        attempt: u32,
        after: std::time::Duration,
        warnings: &mut Vec<String>,
    ) {
        self.breaker.record_failure(BackendStage::Extraction);
        tracing::warn!(field = %spec.name, attempt = attempt, timeout = ?after, "Backend call timed out");
        warnings.push(format!("attempt {}: backend timed out after {:?}", attempt, after));
    }
}

/// Type-check an answer and its evidence.
fn accept(
    spec: &FieldSpec,
    answer: &BackendAnswer,
    evidence: &EvidenceValidator,
) -> Result<FieldValue, String> {
    let value = spec.accept_answer(&answer.value).map_err(|e| e.to_string())?;
    evidence
        .check_quote(answer.evidence.as_deref())
        .map_err(|e| e.to_string())?;
    if spec.critical && spec.kind.is_text() {
        if let FieldValue::Text(text) = &value {
            evidence.check_verbatim(text).map_err(|e| e.to_string())?;
        }
    }
    Ok(value)
}
