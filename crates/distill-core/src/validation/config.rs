//! Validation configuration.

use crate::generation::Condition;
use crate::schema::SchemaError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phrases that leak assistant boilerplate into generated documents.
pub const DEFAULT_DENYLIST: &[&str] = &[
    "As an AI",
    "As a language model",
    "I cannot",
    "I can't",
    "I'm unable",
    "I am not able",
    "I don't have access",
    "My training data",
    "I'm designed to",
    "Hello!",
    "Hi there!",
    "Greetings!",
    "Is there anything else",
    "Feel free to ask",
    "How can I help",
    "Let me know if",
    "I hope this helps",
    "Please note that",
    "In summary,",
];

/// Placeholder markers and unrendered template syntax.
pub const DEFAULT_DENYLIST_PATTERNS: &[&str] = &[
    r"\{\{[^}]*\}\}",
    r"\{%[^%]*%\}",
    r"\[INSERT[^\]]*\]",
    r"<<[^>]*>>",
    r"\[\[[^\]]*\]\]",
    r"\bPLACEHOLDER\b",
    r"\bTODO\b",
    r"\bTBD\b",
];

/// Heading line that starts a section.
pub const DEFAULT_SECTION_HEADING: &str = r"^[ \t]*Section\s+\d+\b";

/// Errors in validation or runtime configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("{name} must be between 0 and 100, got {value}")]
    OutOfRange { name: &'static str, value: f64 },

    #[error("min_sentence_words ({min}) must not exceed max_sentence_words ({max})")]
    SentenceBounds { min: usize, max: usize },

    #[error("Cross-field rule '{name}': {reason}")]
    InvalidRule { name: String, reason: String },
}

/// A consistency rule between extracted fields, checked by the field layer.
///
/// When `when` holds, the text of `fields` must mention at least one of
/// `mentions_any` (case-insensitive). With no terms, the fields must not
/// all be empty. A broken rule is a warning, never an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossFieldRule {
    pub name: String,
    pub when: Condition,
    pub fields: Vec<String>,
    #[serde(default)]
    pub mentions_any: Vec<String>,
    /// Replaces the generated warning text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CrossFieldRule {
    pub fn new<I, S>(name: impl Into<String>, when: &str, fields: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            name: name.into(),
            when: Condition::parse(when)?,
            fields: fields.into_iter().map(Into::into).collect(),
            mentions_any: Vec::new(),
            message: None,
        })
    }

    pub fn mentioning<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mentions_any = terms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Whether the combined field text satisfies the rule.
    pub(crate) fn is_satisfied_by(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        if self.mentions_any.is_empty() {
            return !text.trim().is_empty();
        }
        self.mentions_any
            .iter()
            .any(|term| text.contains(&term.to_lowercase()))
    }

    pub(crate) fn describe(&self) -> String {
        if let Some(message) = &self.message {
            return message.clone();
        }
        if self.mentions_any.is_empty() {
            format!(
                "{}: '{}' holds but {} is empty",
                self.name,
                self.when,
                self.fields.join(", ")
            )
        } else {
            format!(
                "{}: '{}' holds but {} mention none of: {}",
                self.name,
                self.when,
                self.fields.join(", "),
                self.mentions_any.join(", ")
            )
        }
    }
}

/// Tunables for the four validation layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Substrings that must not appear (case-insensitive)
    pub denylist: Vec<String>,

    /// Regexes that must not match (case-insensitive)
    pub denylist_patterns: Vec<String>,

    /// CV above this percentage produces a warning
    pub cv_target: f64,

    /// Preservation below this percentage turns missing critical values into issues
    pub preservation_target: f64,

    /// Sentences shorter than this are reported as fragments
    pub min_sentence_words: usize,

    /// Sentences longer than this are reported as run-ons
    pub max_sentence_words: usize,

    /// Multi-line, case-insensitive regex matching section headings
    pub section_heading_pattern: String,

    /// Consistency rules between extracted fields
    pub cross_field_rules: Vec<CrossFieldRule>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            denylist: DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect(),
            denylist_patterns: DEFAULT_DENYLIST_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cv_target: 15.0,
            preservation_target: 100.0,
            min_sentence_words: 3,
            max_sentence_words: 50,
            section_heading_pattern: DEFAULT_SECTION_HEADING.to_string(),
            cross_field_rules: Vec::new(),
        }
    }
}

/// Regexes compiled from a [`ValidationConfig`].
#[derive(Debug, Clone)]
pub(crate) struct CompiledPatterns {
    pub denylist: Vec<Regex>,
    pub section_heading: Regex,
}

impl ValidationConfig {
    /// Check ranges and patterns without keeping the compiled result.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.compile().map(|_| ())
    }

    /// Check ranges and compile every pattern.
    pub(crate) fn compile(&self) -> Result<CompiledPatterns, ConfigError> {
        for (name, value) in [
            ("cv_target", self.cv_target),
            ("preservation_target", self.preservation_target),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::OutOfRange { name, value });
            }
        }
        if self.min_sentence_words > self.max_sentence_words {
            return Err(ConfigError::SentenceBounds {
                min: self.min_sentence_words,
                max: self.max_sentence_words,
            });
        }
        for rule in &self.cross_field_rules {
            if rule.fields.is_empty() {
                return Err(ConfigError::InvalidRule {
                    name: rule.name.clone(),
                    reason: "no fields to check".to_string(),
                });
            }
        }

        let denylist = self
            .denylist_patterns
            .iter()
            .map(|p| build(p, false))
            .collect::<Result<Vec<_>, _>>()?;
        let section_heading = build(&self.section_heading_pattern, true)?;

        Ok(CompiledPatterns {
            denylist,
            section_heading,
        })
    }
}

fn build(pattern: &str, multi_line: bool) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(multi_line)
        .build()
        .map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}
