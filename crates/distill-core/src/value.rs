//! Extracted values and their provenance.
//!
//! An [`ExtractedValue`] is created exactly once per field by the extraction
//! stage and never mutated afterwards. Fields are private so downstream
//! stages can read them but not rewrite them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A typed field value.
///
/// Enumeration values are carried as [`FieldValue::Text`] holding the
/// canonical spelling from the schema's allowed set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// True for blank text. Booleans and numbers are never empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Text(s) if s.trim().is_empty())
    }

    /// Truthiness used by bare conditions such as `has_direct_benefits`.
    pub fn is_truthy(&self) -> bool {
        match self {
            FieldValue::Bool(b) => *b,
            FieldValue::Number(n) => *n != 0.0,
            FieldValue::Text(s) => !s.trim().is_empty(),
        }
    }

    /// Render the value exactly as it is embedded into generated text.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// Where an extracted value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// Accepted answer from the intelligent backend.
    Ai,
    /// Deterministic pattern match or declared default.
    Fallback,
}

/// The outcome of extracting one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedValue {
    field: String,
    value: FieldValue,
    rationale: String,
    source: ValueSource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(default)]
    attempts: u32,
}

impl ExtractedValue {
    /// Value accepted from the intelligent backend.
    pub fn from_backend(
        field: impl Into<String>,
        value: FieldValue,
        rationale: impl Into<String>,
        attempts: u32,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            field: field.into(),
            value,
            rationale: rationale.into(),
            source: ValueSource::Ai,
            warnings,
            attempts,
        }
    }

    /// Value produced by the deterministic chain.
    pub fn from_fallback(
        field: impl Into<String>,
        value: FieldValue,
        rationale: impl Into<String>,
        attempts: u32,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            field: field.into(),
            value,
            rationale: rationale.into(),
            source: ValueSource::Fallback,
            warnings,
            attempts,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn source(&self) -> ValueSource {
        self.source
    }

    /// Everything that went wrong on the way to this value, in order.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Backend calls made for this field.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// True when the value did not come cleanly from the backend.
    pub fn is_degraded(&self) -> bool {
        self.source == ValueSource::Fallback || !self.warnings.is_empty()
    }
}

/// Extracted values keyed by field name.
pub type ExtractedValues = BTreeMap<String, ExtractedValue>;
