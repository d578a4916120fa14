//! Field declarations and value constraints.

use super::pattern::PatternSpec;
use crate::text;
use crate::value::FieldValue;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default word limit for short text fields.
pub const SHORT_TEXT_MAX_WORDS: usize = 30;

/// Default word limit for long text fields.
pub const LONG_TEXT_MAX_WORDS: usize = 200;

/// Answers that mean "nothing found" and must never be accepted as text.
const PLACEHOLDER_ANSWERS: &[&str] = &[
    "not specified",
    "not stated",
    "not mentioned",
    "unknown",
    "n/a",
    "na",
    "none found",
    "tbd",
    "null",
];

/// The kind of a field, which decides parsing and default limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Boolean,
    Enumeration,
    ShortText,
    LongText,
    Numeric,
}

impl FieldKind {
    pub fn is_text(self) -> bool {
        matches!(self, FieldKind::ShortText | FieldKind::LongText)
    }

    /// The value a field of this kind takes when nothing else is known.
    pub fn empty_value(self) -> FieldValue {
        match self {
            FieldKind::Boolean => FieldValue::Bool(false),
            FieldKind::Numeric => FieldValue::Number(0.0),
            _ => FieldValue::Text(String::new()),
        }
    }

    fn expected(self) -> &'static str {
        match self {
            FieldKind::Boolean => "a boolean",
            FieldKind::Enumeration => "one of the allowed values",
            FieldKind::ShortText | FieldKind::LongText => "text",
            FieldKind::Numeric => "a number",
        }
    }
}

/// Declared limits on a field's value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldConstraints {
    /// Maximum length in characters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    /// Maximum number of words
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_words: Option<usize>,

    /// Allowed values for enumeration fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
}

/// A value that violates its field's declaration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldValidationError {
    #[error("field '{field}': expected {expected}, got '{raw}'")]
    KindMismatch {
        field: String,
        expected: &'static str,
        raw: String,
    },

    #[error("field '{field}': {length} characters exceeds max length {max}")]
    TooLong {
        field: String,
        length: usize,
        max: usize,
    },

    #[error("field '{field}': {words} words exceeds limit of {max}")]
    TooManyWords {
        field: String,
        words: usize,
        max: usize,
    },

    #[error("field '{field}': '{value}' is not one of {allowed:?}")]
    NotAllowed {
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("field '{field}': empty or placeholder answer '{raw}'")]
    Placeholder { field: String, raw: String },
}

/// Declaration of one field to extract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Unique name within the schema
    pub name: String,

    pub kind: FieldKind,

    #[serde(default)]
    pub constraints: FieldConstraints,

    /// Critical values must appear verbatim in the rendered output
    #[serde(default)]
    pub critical: bool,

    /// Required fields fail validation when missing or empty
    #[serde(default)]
    pub required: bool,

    /// Instruction handed to the intelligent backend
    pub extraction_prompt: String,

    /// Value used when neither the backend nor the patterns produce one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<FieldValue>,

    /// Deterministic patterns tried when the backend gives nothing usable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<PatternSpec>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind, extraction_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            constraints: FieldConstraints::default(),
            critical: false,
            required: false,
            extraction_prompt: extraction_prompt.into(),
            default: None,
            fallback: None,
        }
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_max_length(mut self, max: usize) -> Self {
        self.constraints.max_length = Some(max);
        self
    }

    pub fn with_max_words(mut self, max: usize) -> Self {
        self.constraints.max_words = Some(max);
        self
    }

    pub fn with_allowed_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraints.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_default(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_fallback(mut self, fallback: PatternSpec) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Word limit in effect: the declared one, else the kind's default.
    pub fn max_words(&self) -> Option<usize> {
        self.constraints.max_words.or(match self.kind {
            FieldKind::ShortText => Some(SHORT_TEXT_MAX_WORDS),
            FieldKind::LongText => Some(LONG_TEXT_MAX_WORDS),
            _ => None,
        })
    }

    /// The declared default, else the first allowed value for enumerations,
    /// else the kind's empty value.
    pub fn default_value(&self) -> FieldValue {
        if let Some(default) = &self.default {
            return default.clone();
        }
        match (self.kind, self.constraints.allowed_values.first()) {
            (FieldKind::Enumeration, Some(first)) => FieldValue::Text(first.clone()),
            (kind, _) => kind.empty_value(),
        }
    }

    /// Parse a raw string into this field's type and check constraints.
    ///
    /// Used for pattern matches and defaults. Empty text is allowed.
    pub fn coerce(&self, raw: &str) -> Result<FieldValue, FieldValidationError> {
        let trimmed = raw.trim();
        let value = match self.kind {
            FieldKind::Boolean => FieldValue::Bool(
                parse_bool(trimmed).ok_or_else(|| self.mismatch(trimmed))?,
            ),
            FieldKind::Numeric => FieldValue::Number(
                parse_number(trimmed).ok_or_else(|| self.mismatch(trimmed))?,
            ),
            FieldKind::Enumeration => {
                let canonical = self.match_allowed(trimmed).ok_or_else(|| {
                    FieldValidationError::NotAllowed {
                        field: self.name.clone(),
                        value: trimmed.to_string(),
                        allowed: self.constraints.allowed_values.clone(),
                    }
                })?;
                FieldValue::Text(canonical.to_string())
            }
            FieldKind::ShortText | FieldKind::LongText => FieldValue::Text(trimmed.to_string()),
        };
        self.check(&value)?;
        Ok(value)
    }

    /// Parse an answer from the intelligent backend.
    ///
    /// Stricter than [`coerce`](Self::coerce): blank and placeholder
    /// answers are rejected so the caller can retry or fall back.
    pub fn accept_answer(&self, raw: &str) -> Result<FieldValue, FieldValidationError> {
        let trimmed = raw.trim();
        let lowered = trimmed.to_lowercase();
        if self.kind != FieldKind::Enumeration
            && (trimmed.is_empty() || PLACEHOLDER_ANSWERS.contains(&lowered.as_str()))
        {
            return Err(FieldValidationError::Placeholder {
                field: self.name.clone(),
                raw: trimmed.to_string(),
            });
        }
        self.coerce(trimmed)
    }

    /// Check an already-typed value against this declaration.
    pub fn check(&self, value: &FieldValue) -> Result<(), FieldValidationError> {
        match (self.kind, value) {
            (FieldKind::Boolean, FieldValue::Bool(_)) => Ok(()),
            (FieldKind::Numeric, FieldValue::Number(n)) if n.is_finite() => Ok(()),
            (FieldKind::Enumeration, FieldValue::Text(s)) => {
                if self.match_allowed(s).is_some() {
                    Ok(())
                } else {
                    Err(FieldValidationError::NotAllowed {
                        field: self.name.clone(),
                        value: s.clone(),
                        allowed: self.constraints.allowed_values.clone(),
                    })
                }
            }
            (FieldKind::ShortText | FieldKind::LongText, FieldValue::Text(s)) => self.check_text(s),
            (_, other) => Err(self.mismatch(&other.render())),
        }
    }

    /// Shorten text so it satisfies the length and word limits.
    pub fn clamp_text(&self, raw: &str) -> String {
        let mut clamped = raw.trim().to_string();
        if let Some(max) = self.max_words() {
            clamped = text::limit_words(&clamped, max);
        }
        if let Some(max) = self.constraints.max_length {
            clamped = text::limit_chars(&clamped, max);
        }
        clamped
    }

    fn check_text(&self, value: &str) -> Result<(), FieldValidationError> {
        if let Some(max) = self.constraints.max_length {
            let length = value.chars().count();
            if length > max {
                return Err(FieldValidationError::TooLong {
                    field: self.name.clone(),
                    length,
                    max,
                });
            }
        }
        if let Some(max) = self.max_words() {
            let words = text::word_count(value);
            if words > max {
                return Err(FieldValidationError::TooManyWords {
                    field: self.name.clone(),
                    words,
                    max,
                });
            }
        }
        Ok(())
    }

    /// Case-insensitive lookup returning the declared spelling.
    fn match_allowed(&self, candidate: &str) -> Option<&str> {
        let wanted = candidate.trim().to_lowercase();
        self.constraints
            .allowed_values
            .iter()
            .find(|allowed| allowed.trim().to_lowercase() == wanted)
            .map(String::as_str)
    }

    fn mismatch(&self, raw: &str) -> FieldValidationError {
        FieldValidationError::KindMismatch {
            field: self.name.clone(),
            expected: self.kind.expected(),
            raw: raw.to_string(),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}
