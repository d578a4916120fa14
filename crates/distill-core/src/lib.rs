//! # distill-core
//!
//! Deterministic engine for turning long source documents into short,
//! validated summaries.
//!
//! This crate holds everything that does not need an intelligent backend:
//! - field schemas and typed values
//! - the regex fallback extractor
//! - generation rules with conditional phrasing
//! - the four-layer validation orchestrator and its consistency tracker
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same input always produces same output
//! 2. **No backend calls**: AI-assisted paths live in `distill-runtime`
//! 3. **Never fails on data quality**: every field resolves to a value,
//!    every validation produces a report
//! 4. **Verbatim facts**: critical values are never normalized or paraphrased
//!
//! ## Example
//!
//! ```rust,ignore
//! use distill_core::{FieldSchema, GenerationContext, ValidationConfig, ValidationOrchestrator};
//! use std::sync::Arc;
//!
//! let schema = Arc::new(FieldSchema::from_yaml_file("consent.yaml")?);
//! let extracted = distill_core::extract_deterministic(&document, &schema)?;
//!
//! let mut ctx = GenerationContext::new(document, "informed_consent", "short_form");
//! ctx.set_extracted(extracted);
//! ctx.declare_critical_from(&schema);
//! ctx.set_rendered(rendered);
//!
//! let validator = ValidationOrchestrator::new(schema, ValidationConfig::default())?;
//! let report = validator.validate(&ctx, &ctx.critical_values(), 5);
//! ```

pub mod consistency;
pub mod context;
pub mod fallback;
pub mod generation;
pub mod schema;
pub mod text;
pub mod validation;
pub mod value;

// Re-export main types at crate root
pub use consistency::{ConsistencySummary, ConsistencyTracker, RunSample, TrackerKey};
pub use context::{critical_values_from, CriticalValue, GenerationContext};
pub use fallback::{FallbackExtractor, RegexFallback};
pub use generation::{
    Condition, GenerationRule, GenerationRules, PhrasingArm, SlotSource, SynthesizedContent,
    SynthesizedSlot,
};
pub use schema::{
    FieldConstraints, FieldKind, FieldSchema, FieldSpec, FieldValidationError, PatternSpec,
    SchemaError,
};
pub use validation::{
    ConfigError, CriticalValueMissing, CrossFieldRule, IssueCode, LayerKind, LayerOutcome,
    ReportMetrics, ValidationConfig, ValidationIssue, ValidationNote, ValidationOrchestrator,
    ValidationReport,
};
pub use value::{ExtractedValue, ExtractedValues, FieldValue, ValueSource};

use thiserror::Error;

/// Errors raised before any field is processed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Reject documents that cannot be extracted from.
pub fn check_document(document_text: &str) -> Result<(), ExtractionError> {
    if document_text.trim().is_empty() {
        return Err(ExtractionError::InvalidInput(
            "document text is empty or whitespace".to_string(),
        ));
    }
    Ok(())
}

/// Extract every field using only patterns and defaults.
///
/// The same path the runtime takes when no intelligent backend is configured.
pub fn extract_deterministic(
    document_text: &str,
    schema: &FieldSchema,
) -> Result<ExtractedValues, ExtractionError> {
    check_document(document_text)?;
    let extractor = RegexFallback;
    Ok(schema
        .fields()
        .iter()
        .map(|spec| {
            let value = fallback::resolve(document_text, spec, &extractor, Vec::new(), 0);
            (spec.name.clone(), value)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_invalid_input() {
        let schema =
            FieldSchema::new(vec![FieldSpec::new("x", FieldKind::ShortText, "?")]).unwrap();
        assert!(matches!(
            extract_deterministic("   \n\t", &schema),
            Err(ExtractionError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_every_field_gets_a_value() {
        let schema = FieldSchema::new(vec![
            FieldSpec::new("is_pediatric", FieldKind::Boolean, "Children?"),
            FieldSpec::new("study_duration", FieldKind::ShortText, "How long?"),
            FieldSpec::new("arms", FieldKind::Numeric, "How many arms?"),
            FieldSpec::new("study_type", FieldKind::Enumeration, "Kind?")
                .with_allowed_values(["studying", "collecting"]),
        ])
        .unwrap();
        let values = extract_deterministic("An unrelated document.", &schema).unwrap();
        assert_eq!(values.len(), schema.len());
        assert_eq!(values["is_pediatric"].value(), &FieldValue::Bool(false));
        assert_eq!(values["arms"].value(), &FieldValue::Number(0.0));
        assert_eq!(values["study_type"].value(), &FieldValue::Text("studying".into()));
        assert!(values.values().all(|v| v.source() == ValueSource::Fallback));
    }
}
