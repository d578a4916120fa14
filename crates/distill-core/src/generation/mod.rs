//! Generation rules: which phrasing each output slot gets.
//!
//! A [`GenerationRule`] owns one output slot. Its arms are checked in
//! order and the first arm whose condition holds supplies the phrasing;
//! if none holds, `otherwise` is used. Phrasings reference extracted
//! values with `{field}` placeholders.
//!
//! Everything here is deterministic. The optional rewrite by an
//! intelligent backend lives in the runtime crate and always starts from
//! the fixed phrasing produced by [`GenerationRule::render_fixed`].

mod condition;
pub mod phrasing;

pub use condition::{Condition, Evaluation};

use crate::schema::SchemaError;
use crate::value::ExtractedValues;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::Path;

/// One conditional phrasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhrasingArm {
    pub when: Condition,
    pub phrasing: String,
}

/// Rule for producing one slot of generated content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRule {
    /// Output slot name, unique within a rule set
    pub slot: String,

    /// Fields this slot is built from
    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(default)]
    pub arms: Vec<PhrasingArm>,

    /// Phrasing used when no arm matches. May be empty.
    #[serde(default)]
    pub otherwise: String,

    /// Extra guidance for the backend rewrite
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,

    /// Never hand this slot to the backend
    #[serde(default)]
    pub fixed: bool,
}

/// The phrasing chosen for a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection<'a> {
    pub phrasing: &'a str,
    /// Index of the matching arm, `None` for `otherwise`
    pub arm: Option<usize>,
    pub warnings: Vec<String>,
}

/// How a slot's final text was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotSource {
    /// Rewritten by the intelligent backend
    Ai,
    /// Deterministic phrasing with substituted values
    Fixed,
}

/// Generated text for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesizedSlot {
    pub slot: String,
    pub text: String,
    pub sources: Vec<String>,
    pub origin: SlotSource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Synthesized slots keyed by slot name.
pub type SynthesizedContent = BTreeMap<String, SynthesizedSlot>;

impl GenerationRule {
    pub fn new(slot: impl Into<String>, otherwise: impl Into<String>) -> Self {
        Self {
            slot: slot.into(),
            sources: Vec::new(),
            arms: Vec::new(),
            otherwise: otherwise.into(),
            guidance: None,
            fixed: false,
        }
    }

    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Add an arm. Fails if the condition does not parse.
    pub fn when(mut self, condition: &str, phrasing: impl Into<String>) -> Result<Self, SchemaError> {
        self.arms.push(PhrasingArm {
            when: Condition::parse(condition)?,
            phrasing: phrasing.into(),
        });
        Ok(self)
    }

    pub fn with_guidance(mut self, guidance: impl Into<String>) -> Self {
        self.guidance = Some(guidance.into());
        self
    }

    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }

    /// Pick the phrasing for the given values.
    pub fn select(&self, values: &ExtractedValues) -> Selection<'_> {
        let mut warnings = Vec::new();

        for (index, arm) in self.arms.iter().enumerate() {
            let evaluation = arm.when.evaluate(values);
            if !evaluation.missing.is_empty() {
                let missing: Vec<&str> = evaluation.missing.iter().map(String::as_str).collect();
                tracing::warn!(
                    slot = %self.slot,
                    condition = %arm.when,
                    missing = ?missing,
                    "Condition references missing fields, treating as false"
                );
                warnings.push(format!(
                    "condition '{}' references missing field(s) {}; treated as false",
                    arm.when,
                    missing.join(", ")
                ));
            }
            if evaluation.result {
                return Selection {
                    phrasing: &arm.phrasing,
                    arm: Some(index),
                    warnings,
                };
            }
        }

        Selection {
            phrasing: &self.otherwise,
            arm: None,
            warnings,
        }
    }

    /// Select a phrasing and substitute values, without any backend.
    pub fn render_fixed(&self, values: &ExtractedValues, critical: &BTreeSet<&str>) -> SynthesizedSlot {
        let selection = self.select(values);
        let filled = phrasing::fill(selection.phrasing, values, critical);

        let mut warnings = selection.warnings;
        for name in filled.missing {
            warnings.push(format!("placeholder '{}' has no extracted value", name));
        }

        SynthesizedSlot {
            slot: self.slot.clone(),
            text: filled.text,
            sources: self.sources_for(selection.phrasing),
            origin: SlotSource::Fixed,
            warnings,
        }
    }

    /// Declared sources followed by any other field the phrasing references.
    pub fn sources_for(&self, phrasing: &str) -> Vec<String> {
        let mut sources = self.sources.clone();
        for name in phrasing::placeholders(phrasing) {
            if !sources.contains(&name) {
                sources.push(name);
            }
        }
        sources
    }
}

impl SynthesizedSlot {
    /// Critical source fields, with their rendered values, that this slot must carry.
    pub fn critical_sources(
        &self,
        values: &ExtractedValues,
        critical: &BTreeSet<&str>,
    ) -> Vec<(String, String)> {
        self.sources
            .iter()
            .filter(|s| critical.contains(s.as_str()))
            .filter_map(|s| values.get(s).map(|v| (s.clone(), v.value().render())))
            .filter(|(_, rendered)| !rendered.trim().is_empty())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RulesDocument {
    rules: Vec<GenerationRule>,
}

/// An ordered set of generation rules with unique slot names.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationRules {
    rules: Vec<GenerationRule>,
}

impl GenerationRules {
    pub fn new(rules: Vec<GenerationRule>) -> Result<Self, SchemaError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.slot.as_str()) {
                return Err(SchemaError::DuplicateSlot(rule.slot.clone()));
            }
        }
        Ok(Self { rules })
    }

    /// Parse rules from YAML. Conditions are parsed here, so a malformed
    /// condition fails at load time.
    pub fn from_yaml(yaml: &str) -> Result<Self, SchemaError> {
        let document: RulesDocument = serde_yaml::from_str(yaml)?;
        Self::new(document.rules)
    }

    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let document: RulesDocument = serde_json::from_str(json)?;
        Self::new(document.rules)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    pub fn rules(&self) -> &[GenerationRule] {
        &self.rules
    }

    pub fn get(&self, slot: &str) -> Option<&GenerationRule> {
        self.rules.iter().find(|r| r.slot == slot)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Render every slot with fixed phrasing.
    pub fn render_fixed(&self, values: &ExtractedValues, critical: &BTreeSet<&str>) -> SynthesizedContent {
        self.rules
            .iter()
            .map(|rule| (rule.slot.clone(), rule.render_fixed(values, critical)))
            .collect()
    }
}
