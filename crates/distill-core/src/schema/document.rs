//! JSON Schema validation for field schema documents.
//!
//! Schema files are checked against `schema/field_schema.schema.json`
//! before they are deserialized, so structural mistakes are reported with
//! their location instead of as a serde error.

use std::sync::OnceLock;

/// Embedded document schema (loaded at compile time).
const FIELD_SCHEMA_JSON: &str = include_str!("../../schema/field_schema.schema.json");

/// Compiled validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn get_validator() -> Result<&'static jsonschema::Validator, String> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(FIELD_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result.as_ref().map_err(Clone::clone)
}

/// Validate a schema document, returning every violation found.
pub fn validate_document(document: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e])?;

    let errors: Vec<String> = validator
        .iter_errors(document)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// True when the document passes structural validation.
pub fn is_valid_document(document: &serde_json::Value) -> bool {
    get_validator()
        .map(|v| v.is_valid(document))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_document_passes() {
        let doc = serde_json::json!({
            "fields": [
                { "name": "is_pediatric", "kind": "boolean", "extraction_prompt": "Children?" }
            ]
        });
        assert!(validate_document(&doc).is_ok());
        assert!(is_valid_document(&doc));
    }

    #[test]
    fn test_unknown_kind_fails() {
        let doc = serde_json::json!({
            "fields": [
                { "name": "x", "kind": "date", "extraction_prompt": "When?" }
            ]
        });
        let errors = validate_document(&doc).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_empty_field_list_fails() {
        assert!(validate_document(&serde_json::json!({ "fields": [] })).is_err());
    }

    #[test]
    fn test_field_name_must_be_identifier() {
        let doc = serde_json::json!({
            "fields": [
                { "name": "study duration", "kind": "short_text", "extraction_prompt": "How long?" }
            ]
        });
        assert!(!is_valid_document(&doc));
    }

    #[test]
    fn test_additional_properties_fail() {
        let doc = serde_json::json!({
            "fields": [
                {
                    "name": "x",
                    "kind": "short_text",
                    "extraction_prompt": "?",
                    "max_words": 3
                }
            ]
        });
        assert!(validate_document(&doc).is_err());
    }
}
