//! Deterministic fallback extraction.
//!
//! When the intelligent backend is absent, fails or keeps giving invalid
//! answers, each field is resolved here: first by the field's patterns,
//! then by its declared default. This path has no I/O and never fails,
//! so every field always ends up with a value.

use crate::schema::{FieldKind, FieldSpec, PatternSpec};
use crate::text;
use crate::value::ExtractedValue;

/// Finds a raw value for a field in the document text.
///
/// Implementations must be deterministic: the same text and pattern
/// always give the same result.
pub trait FallbackExtractor: Send + Sync {
    fn find_match(&self, text: &str, pattern: &PatternSpec) -> Option<String>;
}

/// Regex and keyword matcher.
///
/// Patterns are tried in order; capture group 1 is the value when the
/// pattern has one, otherwise the whole match. If no pattern matches and
/// any keyword occurs (case-insensitive), the raw value is `"true"`.
/// Otherwise the pattern's `absent` value is returned, if declared.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexFallback;

impl FallbackExtractor for RegexFallback {
    fn find_match(&self, text: &str, pattern: &PatternSpec) -> Option<String> {
        for re in pattern.patterns() {
            let Some(caps) = re.captures(text) else {
                continue;
            };
            let Some(m) = caps.get(1).or_else(|| caps.get(0)) else {
                continue;
            };
            let found = text::normalize_whitespace(m.as_str());
            if !found.is_empty() {
                return Some(found);
            }
        }

        if !pattern.keywords().is_empty() {
            let lowered = text.to_lowercase();
            if pattern
                .keywords()
                .iter()
                .any(|k| lowered.contains(&k.to_lowercase()))
            {
                return Some("true".to_string());
            }
        }

        pattern.absent().map(str::to_string)
    }
}

/// Resolve a field without the intelligent backend.
///
/// `warnings` carries whatever already went wrong on the backend path;
/// this function appends to it and records it on the result.
pub fn resolve(
    text: &str,
    spec: &FieldSpec,
    extractor: &dyn FallbackExtractor,
    mut warnings: Vec<String>,
    attempts: u32,
) -> ExtractedValue {
    match &spec.fallback {
        Some(pattern) => match extractor.find_match(text, pattern) {
            Some(raw) => {
                let candidate = if spec.kind.is_text() {
                    spec.clamp_text(&raw)
                } else {
                    raw.clone()
                };
                match spec.coerce(&candidate) {
                    Ok(value) => {
                        tracing::debug!(field = %spec.name, value = %value, "Resolved by pattern");
                        return ExtractedValue::from_fallback(
                            &spec.name,
                            value,
                            format!("deterministic pattern match: '{}'", raw),
                            attempts,
                            warnings,
                        );
                    }
                    Err(e) => warnings.push(format!("pattern match rejected: {}", e)),
                }
            }
            None => warnings.push("no fallback pattern matched".to_string()),
        },
        None => warnings.push("no fallback pattern declared".to_string()),
    }

    let value = spec.default_value();
    let default_label = match (spec.kind, &spec.default) {
        (_, Some(_)) => "declared default",
        (FieldKind::Boolean, None) => "default false",
        (FieldKind::Numeric, None) => "default zero",
        _ => "empty default",
    };
    tracing::warn!(
        field = %spec.name,
        default = %value,
        "No value extracted, using default"
    );
    warnings.push(format!("using {} '{}'", default_label, value));

    ExtractedValue::from_fallback(
        &spec.name,
        value,
        format!(
            "WARNING: no value could be extracted for '{}'; {} used",
            spec.name, default_label
        ),
        attempts,
        warnings,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSchema;
    use crate::value::{FieldValue, ValueSource};
    use proptest::prelude::*;

    const DOCUMENT: &str = "This study lasts 12 weeks. Participants may experience headache. \
                            Children aged 6 to 12 are eligible. Subjects will be randomized.";

    fn duration_spec() -> FieldSpec {
        FieldSpec::new("study_duration", FieldKind::ShortText, "How long?").with_fallback(
            PatternSpec::new([r"(?i)lasts\s+(\d+\s+weeks)"])
                .unwrap()
                .with_absent(""),
        )
    }

    #[test]
    fn test_capture_group_is_the_value() {
        let spec = duration_spec();
        let value = resolve(DOCUMENT, &spec, &RegexFallback, vec![], 0);
        assert_eq!(value.value(), &FieldValue::Text("12 weeks".into()));
        assert_eq!(value.source(), ValueSource::Fallback);
        assert!(value.rationale().contains("pattern match"));
    }

    #[test]
    fn test_keywords_yield_true_for_booleans() {
        let spec = FieldSpec::new("has_randomization", FieldKind::Boolean, "Randomized?")
            .with_fallback(PatternSpec::new(Vec::<&str>::new()).unwrap().with_keywords(["randomized"]));
        let value = resolve(DOCUMENT, &spec, &RegexFallback, vec![], 0);
        assert_eq!(value.value(), &FieldValue::Bool(true));
    }

    #[test]
    fn test_enumeration_uses_derived_choice_patterns() {
        let schema = FieldSchema::new(vec![FieldSpec::new(
            "population",
            FieldKind::Enumeration,
            "Who?",
        )
        .with_allowed_values(["Children", "adults"])])
        .unwrap();
        let spec = schema.get("population").unwrap();
        let value = resolve(DOCUMENT, spec, &RegexFallback, vec![], 0);
        assert_eq!(value.value(), &FieldValue::Text("Children".into()));
    }

    #[test]
    fn test_default_used_with_warning() {
        let spec = FieldSpec::new("key_risks", FieldKind::LongText, "Risks?")
            .with_default("risks are described in the full consent form");
        let previous = vec!["attempt 1: backend timed out after 60s".to_string()];
        let value = resolve("nothing relevant", &spec, &RegexFallback, previous, 2);

        assert_eq!(
            value.value(),
            &FieldValue::Text("risks are described in the full consent form".into())
        );
        assert!(value.rationale().starts_with("WARNING"));
        assert_eq!(value.attempts(), 2);
        assert_eq!(value.warnings()[0], "attempt 1: backend timed out after 60s");
        assert!(value.warnings().iter().any(|w| w.contains("declared default")));
    }

    #[test]
    fn test_absent_value_is_coerced() {
        let spec = FieldSpec::new("has_washout", FieldKind::Boolean, "Washout?").with_fallback(
            PatternSpec::new(Vec::<&str>::new())
                .unwrap()
                .with_keywords(["washout"])
                .with_absent("false"),
        );
        let value = resolve(DOCUMENT, &spec, &RegexFallback, vec![], 0);
        assert_eq!(value.value(), &FieldValue::Bool(false));
        assert!(value.rationale().contains("pattern match"));
    }

    #[test]
    fn test_long_match_is_clamped() {
        let spec = FieldSpec::new("study_object", FieldKind::ShortText, "What?")
            .with_max_words(2)
            .with_fallback(PatternSpec::new([r"studying (.+)\."]).unwrap());
        let value = resolve("We are studying a new blood pressure drug.", &spec, &RegexFallback, vec![], 0);
        assert_eq!(value.value(), &FieldValue::Text("a new".into()));
    }

    proptest! {
        #[test]
        fn fallback_is_deterministic(text in "[a-zA-Z0-9 .]{0,200}") {
            let spec = duration_spec();
            let first = resolve(&text, &spec, &RegexFallback, vec![], 0);
            let second = resolve(&text, &spec, &RegexFallback, vec![], 0);
            prop_assert_eq!(first, second);
        }
    }
}
