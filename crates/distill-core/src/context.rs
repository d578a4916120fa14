//! Per-request state shared by the pipeline stages.

use crate::consistency::TrackerKey;
use crate::generation::SynthesizedContent;
use crate::schema::FieldSchema;
use crate::validation::{LayerKind, LayerOutcome, ValidationReport};
use crate::value::{ExtractedValues, FieldValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A string that must appear verbatim in the rendered output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CriticalValue {
    pub value: String,
    /// Originating field, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl CriticalValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            field: None,
        }
    }

    pub fn for_field(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            field: Some(field.into()),
        }
    }
}

impl fmt::Display for CriticalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{} ({})", self.value, field),
            None => f.write_str(&self.value),
        }
    }
}

/// Critical values implied by a schema: every non-empty, non-boolean value
/// of a field marked critical. Critical fields left empty are reported by
/// the critical value layer of validation.
pub fn critical_values_from(schema: &FieldSchema, extracted: &ExtractedValues) -> Vec<CriticalValue> {
    schema
        .fields()
        .iter()
        .filter(|spec| spec.critical)
        .filter_map(|spec| extracted.get(&spec.name))
        .filter(|v| !v.value().is_empty() && !matches!(v.value(), FieldValue::Bool(_)))
        .map(|v| CriticalValue::for_field(v.field(), v.value().render()))
        .collect()
}

/// Accumulates one request's data across extraction, synthesis, rendering
/// and validation. Owned by exactly one request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationContext {
    document_text: String,
    document_type: String,
    template_id: String,
    parameters: BTreeMap<String, String>,
    extracted: ExtractedValues,
    synthesized: SynthesizedContent,
    critical_values: BTreeSet<CriticalValue>,
    rendered: Option<String>,
    validation_results: BTreeMap<LayerKind, LayerOutcome>,
}

impl GenerationContext {
    pub fn new(
        document_text: impl Into<String>,
        document_type: impl Into<String>,
        template_id: impl Into<String>,
    ) -> Self {
        Self {
            document_text: document_text.into(),
            document_type: document_type.into(),
            template_id: template_id.into(),
            ..Default::default()
        }
    }

    /// Add a parameter override. Overrides win over extracted and synthesized values.
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn set_parameter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.parameters.insert(key.into(), value.into());
    }

    pub fn set_extracted(&mut self, values: ExtractedValues) {
        self.extracted = values;
    }

    pub fn set_synthesized(&mut self, content: SynthesizedContent) {
        self.synthesized = content;
    }

    pub fn set_rendered(&mut self, rendered: impl Into<String>) {
        self.rendered = Some(rendered.into());
    }

    pub fn add_critical_value(&mut self, value: CriticalValue) {
        self.critical_values.insert(value);
    }

    /// Declare the critical values implied by the schema and the current extraction.
    pub fn declare_critical_from(&mut self, schema: &FieldSchema) {
        for value in critical_values_from(schema, &self.extracted) {
            self.critical_values.insert(value);
        }
    }

    /// Store the per-layer outcomes of a validation run.
    pub fn record_validation(&mut self, report: &ValidationReport) {
        for outcome in &report.layers {
            self.validation_results.insert(outcome.layer, outcome.clone());
        }
    }

    /// Flat string map handed to the templating engine.
    ///
    /// Extracted values come first, synthesized slots overwrite them, and
    /// parameter overrides overwrite both.
    pub fn render_map(&self) -> BTreeMap<String, String> {
        let mut map: BTreeMap<String, String> = self
            .extracted
            .iter()
            .map(|(name, v)| (name.clone(), v.value().render()))
            .collect();
        for (slot, content) in &self.synthesized {
            map.insert(slot.clone(), content.text.clone());
        }
        for (key, value) in &self.parameters {
            map.insert(key.clone(), value.clone());
        }
        map
    }

    pub fn document_text(&self) -> &str {
        &self.document_text
    }

    pub fn document_type(&self) -> &str {
        &self.document_type
    }

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    pub fn tracker_key(&self) -> TrackerKey {
        TrackerKey::new(&self.document_type, &self.template_id)
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    pub fn extracted(&self) -> &ExtractedValues {
        &self.extracted
    }

    pub fn synthesized(&self) -> &SynthesizedContent {
        &self.synthesized
    }

    pub fn rendered(&self) -> Option<&str> {
        self.rendered.as_deref()
    }

    /// Critical values in a stable order.
    pub fn critical_values(&self) -> Vec<CriticalValue> {
        self.critical_values.iter().cloned().collect()
    }

    pub fn validation_results(&self) -> &BTreeMap<LayerKind, LayerOutcome> {
        &self.validation_results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{SlotSource, SynthesizedSlot};
    use crate::schema::{FieldKind, FieldSpec};
    use crate::value::ExtractedValue;

    fn extracted() -> ExtractedValues {
        [
            ("study_duration", FieldValue::Text("12 weeks".into())),
            ("is_pediatric", FieldValue::Bool(false)),
            ("key_risks", FieldValue::Text(String::new())),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), ExtractedValue::from_backend(k, v, "test", 1, vec![])))
        .collect()
    }

    #[test]
    fn test_render_map_precedence() {
        let mut ctx = GenerationContext::new("doc", "informed_consent", "short_form")
            .with_parameter("study_duration", "about three months");
        ctx.set_extracted(extracted());
        ctx.set_synthesized(
            [(
                "is_pediatric".to_string(),
                SynthesizedSlot {
                    slot: "is_pediatric".into(),
                    text: "This study enrolls adults.".into(),
                    sources: vec!["is_pediatric".into()],
                    origin: SlotSource::Fixed,
                    warnings: vec![],
                },
            )]
            .into_iter()
            .collect(),
        );

        let map = ctx.render_map();
        assert_eq!(map["study_duration"], "about three months");
        assert_eq!(map["is_pediatric"], "This study enrolls adults.");
        assert_eq!(map["key_risks"], "");
    }

    #[test]
    fn test_declare_critical_skips_empty_and_booleans() {
        let schema = FieldSchema::new(vec![
            FieldSpec::new("study_duration", FieldKind::ShortText, "How long?").critical(),
            FieldSpec::new("is_pediatric", FieldKind::Boolean, "Children?").critical(),
            FieldSpec::new("key_risks", FieldKind::LongText, "Risks?").critical(),
        ])
        .unwrap();
        let mut ctx = GenerationContext::new("doc", "informed_consent", "short_form");
        ctx.set_extracted(extracted());
        ctx.declare_critical_from(&schema);

        assert_eq!(
            ctx.critical_values(),
            vec![CriticalValue::for_field("study_duration", "12 weeks")]
        );
    }

    #[test]
    fn test_tracker_key() {
        let ctx = GenerationContext::new("doc", "informed_consent", "short_form");
        assert_eq!(ctx.tracker_key(), TrackerKey::new("informed_consent", "short_form"));
    }
}
