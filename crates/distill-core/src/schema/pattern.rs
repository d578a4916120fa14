//! Deterministic fallback patterns attached to a field.

use super::SchemaError;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Regex patterns, keywords and an absent-value used by fallback extraction.
///
/// Patterns are compiled when the field is built, so a bad pattern is a
/// [`SchemaError`] at schema construction and never a runtime failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PatternSpecDef", into = "PatternSpecDef")]
pub struct PatternSpec {
    patterns: Vec<Regex>,
    keywords: Vec<String>,
    absent: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PatternSpecDef {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    absent: Option<String>,
}

impl TryFrom<PatternSpecDef> for PatternSpec {
    type Error = SchemaError;

    fn try_from(def: PatternSpecDef) -> Result<Self, Self::Error> {
        let patterns = def
            .patterns
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            keywords: def.keywords,
            absent: def.absent,
        })
    }
}

impl From<PatternSpec> for PatternSpecDef {
    fn from(spec: PatternSpec) -> Self {
        Self {
            patterns: spec.patterns.iter().map(|r| r.as_str().to_string()).collect(),
            keywords: spec.keywords,
            absent: spec.absent,
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, SchemaError> {
    Regex::new(pattern).map_err(|e| SchemaError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

impl PatternSpec {
    /// Compile a list of regex patterns. Capture group 1 is the value when present.
    pub fn new<I, S>(patterns: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| compile(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            keywords: Vec::new(),
            absent: None,
        })
    }

    /// Keywords whose presence yields `"true"`. Meant for boolean fields.
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Raw value returned when nothing matches.
    pub fn with_absent(mut self, absent: impl Into<String>) -> Self {
        self.absent = Some(absent.into());
        self
    }

    /// Word-bounded, case-insensitive patterns for each allowed value.
    ///
    /// Longer values are tried first so "large numbers of people" wins
    /// over "people" when both occur.
    pub fn for_choices(allowed: &[String]) -> Self {
        let mut choices: Vec<&str> = allowed
            .iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .collect();
        choices.sort_by_key(|v| std::cmp::Reverse(v.len()));

        let patterns = choices
            .into_iter()
            .filter_map(|choice| {
                Regex::new(&format!(r"(?i)\b({})\b", regex::escape(choice))).ok()
            })
            .collect();

        Self {
            patterns,
            keywords: Vec::new(),
            absent: None,
        }
    }

    pub fn patterns(&self) -> &[Regex] {
        &self.patterns
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn absent(&self) -> Option<&str> {
        self.absent.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.keywords.is_empty() && self.absent.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern_is_schema_error() {
        let result = PatternSpec::new(["(unclosed"]);
        assert!(matches!(result, Err(SchemaError::InvalidPattern { .. })));
    }

    #[test]
    fn test_choices_prefer_longest() {
        let allowed = vec!["people".to_string(), "large numbers of people".to_string()];
        let spec = PatternSpec::for_choices(&allowed);
        assert!(spec.patterns()[0].as_str().contains("large numbers of people"));
    }

    #[test]
    fn test_deserialize_compiles_patterns() {
        let yaml = "patterns: ['(?i)lasts\\s+(\\d+\\s+weeks)']\nabsent: ''\n";
        let spec: PatternSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.patterns().len(), 1);
        assert_eq!(spec.absent(), Some(""));

        let bad: Result<PatternSpec, _> = serde_yaml::from_str("patterns: ['[z-a]']");
        assert!(bad.is_err());
    }
}
