//! Referential checks on backend answers.
//!
//! The backend supplies evidence, not facts. An answer whose quoted
//! evidence cannot be found in the document is rejected and handled like
//! any other rejection (stricter retry, then the deterministic path).
//! Whitespace differences are ignored; everything else must match.

use distill_core::text::normalize_whitespace;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvidenceError {
    #[error("quoted evidence not found in document: '{quote}'")]
    QuoteNotFound { quote: String },

    #[error("critical value '{value}' does not appear verbatim in document")]
    ValueNotVerbatim { value: String },
}

/// Checks answers against one document.
#[derive(Debug, Clone)]
pub struct EvidenceValidator {
    normalized: String,
}

impl EvidenceValidator {
    pub fn new(document_text: &str) -> Self {
        Self {
            normalized: normalize_whitespace(document_text),
        }
    }

    fn contains(&self, fragment: &str) -> bool {
        let needle = normalize_whitespace(fragment);
        needle.is_empty() || self.normalized.contains(&needle)
    }

    /// Check a quoted passage. A missing quote is accepted.
    pub fn check_quote(&self, quote: Option<&str>) -> Result<(), EvidenceError> {
        match quote {
            Some(q) if !self.contains(q) => Err(EvidenceError::QuoteNotFound {
                quote: q.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Check that a critical text value was copied rather than paraphrased.
    pub fn check_verbatim(&self, value: &str) -> Result<(), EvidenceError> {
        if self.contains(value) {
            Ok(())
        } else {
            Err(EvidenceError::ValueNotVerbatim {
                value: value.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DOC: &str = "Participation lasts\n  12 weeks in total.\nThere are 3 visits.";

    #[test]
    fn test_quote_found_across_line_breaks() {
        let validator = EvidenceValidator::new(DOC);
        assert!(validator.check_quote(Some("lasts 12 weeks")).is_ok());
        assert!(validator.check_quote(None).is_ok());
    }

    #[test]
    fn test_invented_quote_rejected() {
        let validator = EvidenceValidator::new(DOC);
        assert_eq!(
            validator.check_quote(Some("lasts three months")),
            Err(EvidenceError::QuoteNotFound {
                quote: "lasts three months".into()
            })
        );
    }

    #[test]
    fn test_verbatim_is_case_sensitive() {
        let validator = EvidenceValidator::new(DOC);
        assert!(validator.check_verbatim("12 weeks").is_ok());
        assert!(validator.check_verbatim("12 Weeks").is_err());
    }

    fn words_and_span() -> impl Strategy<Value = (Vec<String>, usize, usize)> {
        prop::collection::vec("[a-z0-9]{1,8}", 1..20).prop_flat_map(|words| {
            let n = words.len();
            (Just(words), 0..n)
                .prop_flat_map(move |(words, start)| (Just(words), Just(start), start + 1..=n))
        })
    }

    proptest! {
        #[test]
        fn any_run_of_words_is_found((words, start, end) in words_and_span()) {
            let document = words.join(" \n\t ");
            let validator = EvidenceValidator::new(&document);
            let quote = words[start..end].join(" ");
            prop_assert!(validator.check_quote(Some(quote.as_str())).is_ok());
            prop_assert!(validator.check_verbatim(&quote).is_ok());
        }
    }
}
