//! Field schemas: what to extract from a document and how to check it.
//!
//! A schema is an ordered list of [`FieldSpec`]s. It can be built in code
//! with [`FieldSchema::new`] or loaded from YAML/JSON, in which case the
//! document is first checked against the embedded JSON Schema.
//!
//! Construction fails fast: duplicate names, enumerations without allowed
//! values, defaults that violate their own constraints and uncompilable
//! patterns are all [`SchemaError`]s.

mod document;
mod field;
mod pattern;

pub use document::{is_valid_document, validate_document};
pub use field::{
    FieldConstraints, FieldKind, FieldSpec, FieldValidationError, LONG_TEXT_MAX_WORDS,
    SHORT_TEXT_MAX_WORDS,
};
pub use pattern::PatternSpec;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors raised while building a schema or generation rules.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to read schema file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Schema document is invalid: {}", .0.join("; "))]
    DocumentError(Vec<String>),

    #[error("Field name must not be empty")]
    EmptyName,

    #[error("Duplicate field name: {0}")]
    DuplicateField(String),

    #[error("Enumeration field '{0}' declares no allowed values")]
    NoAllowedValues(String),

    #[error("Invalid default for field '{field}': {reason}")]
    InvalidDefault { field: String, reason: String },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid condition '{expression}': {reason}")]
    InvalidCondition { expression: String, reason: String },

    #[error("Duplicate slot name: {0}")]
    DuplicateSlot(String),

    #[error("Unsupported schema file extension: {0}")]
    UnsupportedFormat(String),
}

#[derive(Debug, Deserialize)]
struct SchemaDocument {
    #[serde(default)]
    name: Option<String>,
    fields: Vec<FieldSpec>,
}

/// An ordered, validated set of field declarations.
#[derive(Debug, Clone, Serialize)]
pub struct FieldSchema {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    fields: Vec<FieldSpec>,
}

impl FieldSchema {
    /// Build a schema from field declarations.
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, SchemaError> {
        let mut schema = Self { name: None, fields };
        schema.validate()?;
        Ok(schema)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Parse a schema from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, SchemaError> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a schema from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a schema from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a schema from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse a schema file, picking the format from its extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_file(path),
            Some("json") => Self::from_json_file(path),
            other => Err(SchemaError::UnsupportedFormat(
                other.unwrap_or_default().to_string(),
            )),
        }
    }

    fn from_value(value: serde_json::Value) -> Result<Self, SchemaError> {
        validate_document(&value).map_err(SchemaError::DocumentError)?;
        let document: SchemaDocument = serde_json::from_value(value)?;
        let mut schema = Self {
            name: document.name,
            fields: document.fields,
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Check semantic rules the JSON Schema cannot express.
    ///
    /// Also canonicalizes declared defaults and derives fallback patterns
    /// for enumerations that do not declare their own.
    fn validate(&mut self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();

        for spec in &mut self.fields {
            if spec.name.trim().is_empty() {
                return Err(SchemaError::EmptyName);
            }
            if !seen.insert(spec.name.clone()) {
                return Err(SchemaError::DuplicateField(spec.name.clone()));
            }

            if spec.kind == FieldKind::Enumeration {
                if spec.constraints.allowed_values.is_empty() {
                    return Err(SchemaError::NoAllowedValues(spec.name.clone()));
                }
                if spec.fallback.is_none() {
                    spec.fallback = Some(PatternSpec::for_choices(&spec.constraints.allowed_values));
                }
            }

            if let Some(default) = &spec.default {
                let canonical = spec.coerce(&default.render()).map_err(|e| {
                    SchemaError::InvalidDefault {
                        field: spec.name.clone(),
                        reason: e.to_string(),
                    }
                })?;
                spec.default = Some(canonical);
            }
        }

        Ok(())
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Names of fields whose values must survive verbatim.
    pub fn critical_names(&self) -> BTreeSet<&str> {
        self.fields
            .iter()
            .filter(|f| f.critical)
            .map(|f| f.name.as_str())
            .collect()
    }
}
