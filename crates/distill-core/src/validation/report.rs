//! Validation report types.

use crate::context::CriticalValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four validation layers, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Field,
    ContentQuality,
    Structural,
    CriticalValues,
}

impl LayerKind {
    pub fn all() -> [LayerKind; 4] {
        [
            LayerKind::Field,
            LayerKind::ContentQuality,
            LayerKind::Structural,
            LayerKind::CriticalValues,
        ]
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerKind::Field => "field",
            LayerKind::ContentQuality => "content_quality",
            LayerKind::Structural => "structural",
            LayerKind::CriticalValues => "critical_values",
        };
        f.write_str(name)
    }
}

/// Machine-readable category of a blocking issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    MissingRequiredField,
    ConstraintViolation,
    ProhibitedPhrase,
    ArtifactPattern,
    SectionCountMismatch,
    CriticalValueMissing,
}

/// A blocking problem found by one layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub layer: LayerKind,
    pub code: IssueCode,
    pub message: String,
}

/// A non-blocking observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationNote {
    pub layer: LayerKind,
    pub message: String,
}

/// Per-layer result, stored in the context's validation results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerOutcome {
    pub layer: LayerKind,
    pub passed: bool,
    pub issues: usize,
    pub warnings: usize,
}

/// Measurements gathered across layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportMetrics {
    pub word_count: usize,
    pub sentence_count: usize,
    pub average_sentence_length: f64,
    pub section_count: usize,
    pub structural_fingerprint: String,
    pub coefficient_of_variation: f64,
    /// Runs in the consistency window, including this one
    pub consistency_window: usize,
    pub critical_value_preservation_rate: f64,
}

/// Merged result of all four layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True iff there are no issues
    pub passed: bool,
    pub issues: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationNote>,
    pub info: Vec<ValidationNote>,
    pub metrics: ReportMetrics,
    pub layers: Vec<LayerOutcome>,
    pub validated_at: DateTime<Utc>,
}

impl ValidationReport {
    pub fn issues_for(&self, layer: LayerKind) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.layer == layer)
    }

    pub fn has_issue(&self, code: IssueCode) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }

    pub fn layer(&self, layer: LayerKind) -> Option<&LayerOutcome> {
        self.layers.iter().find(|l| l.layer == layer)
    }
}

/// A critical value that is absent from the rendered output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriticalValueMissing {
    pub value: String,
    pub field: Option<String>,
}

impl From<&CriticalValue> for CriticalValueMissing {
    fn from(critical: &CriticalValue) -> Self {
        Self {
            value: critical.value.clone(),
            field: critical.field.clone(),
        }
    }
}

impl fmt::Display for CriticalValueMissing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(
                f,
                "Critical value '{}' for field '{}' not found verbatim in output",
                self.value, field
            ),
            None => write!(f, "Critical value '{}' not found verbatim in output", self.value),
        }
    }
}

impl std::error::Error for CriticalValueMissing {}

/// Collects findings while the layers run.
pub(crate) struct ReportBuilder {
    current: LayerKind,
    issues: Vec<ValidationIssue>,
    warnings: Vec<ValidationNote>,
    info: Vec<ValidationNote>,
    layers: Vec<LayerOutcome>,
    pub(crate) metrics: ReportMetrics,
}

impl ReportBuilder {
    pub(crate) fn new() -> Self {
        Self {
            current: LayerKind::Field,
            issues: Vec::new(),
            warnings: Vec::new(),
            info: Vec::new(),
            layers: Vec::new(),
            metrics: ReportMetrics::default(),
        }
    }

    /// Run one layer, attributing everything it reports to that layer.
    pub(crate) fn run<F>(&mut self, layer: LayerKind, check: F)
    where
        F: FnOnce(&mut Self),
    {
        self.current = layer;
        let issues_before = self.issues.len();
        let warnings_before = self.warnings.len();

        check(self);

        let issues = self.issues.len() - issues_before;
        self.layers.push(LayerOutcome {
            layer,
            passed: issues == 0,
            issues,
            warnings: self.warnings.len() - warnings_before,
        });
    }

    pub(crate) fn issue(&mut self, code: IssueCode, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            layer: self.current,
            code,
            message: message.into(),
        });
    }

    pub(crate) fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(ValidationNote {
            layer: self.current,
            message: message.into(),
        });
    }

    pub(crate) fn info(&mut self, message: impl Into<String>) {
        self.info.push(ValidationNote {
            layer: self.current,
            message: message.into(),
        });
    }

    pub(crate) fn finish(self) -> ValidationReport {
        ValidationReport {
            passed: self.issues.is_empty(),
            issues: self.issues,
            warnings: self.warnings,
            info: self.info,
            metrics: self.metrics,
            layers: self.layers,
            validated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_outcomes_attribute_findings() {
        let mut builder = ReportBuilder::new();
        builder.run(LayerKind::Field, |b| b.warning("degraded"));
        builder.run(LayerKind::ContentQuality, |b| {
            b.issue(IssueCode::ProhibitedPhrase, "Prohibited phrase found: 'As an AI'")
        });
        let report = builder.finish();

        assert!(!report.passed);
        assert_eq!(report.issues[0].layer, LayerKind::ContentQuality);
        assert_eq!(report.warnings[0].layer, LayerKind::Field);
        assert!(report.layer(LayerKind::Field).unwrap().passed);
        assert!(!report.layer(LayerKind::ContentQuality).unwrap().passed);
        assert!(report.has_issue(IssueCode::ProhibitedPhrase));
    }

    #[test]
    fn test_missing_value_message_names_field() {
        let missing = CriticalValueMissing {
            value: "12 weeks".into(),
            field: Some("study_duration".into()),
        };
        let message = missing.to_string();
        assert!(message.contains("12 weeks"));
        assert!(message.contains("study_duration"));
    }
}
