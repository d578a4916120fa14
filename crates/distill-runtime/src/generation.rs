//! Generation engine: extracted values to narrative slots.
//!
//! Every slot starts from its fixed phrasing (see
//! [`GenerationRule::render_fixed`]). With a backend available the fixed
//! text is offered for a rewrite; the rewrite is kept only if every
//! critical source value survives it verbatim. Any failure leaves the
//! fixed phrasing in place, so every declared slot always gets text.

use crate::backend::{BackendError, IntelligentBackend, NullBackend};
use crate::config::SynthesisConfig;
use crate::prompts;
use crate::resilience::{BackendStage, CircuitBreaker};
use distill_core::text::normalize_whitespace;
use distill_core::{
    ExtractedValues, FieldSchema, GenerationRule, GenerationRules, SlotSource, SynthesizedContent,
    SynthesizedSlot,
};
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct GenerationEngine {
    backend: Arc<dyn IntelligentBackend>,
    breaker: Arc<CircuitBreaker>,
    config: SynthesisConfig,
    critical_fields: BTreeSet<String>,
}

impl GenerationEngine {
    pub fn new(backend: Arc<dyn IntelligentBackend>) -> Self {
        Self {
            backend,
            breaker: Arc::new(CircuitBreaker::default()),
            config: SynthesisConfig::default(),
            critical_fields: BTreeSet::new(),
        }
    }

    /// Engine that only ever uses fixed phrasing.
    pub fn deterministic() -> Self {
        Self::new(Arc::new(NullBackend))
    }

    pub fn with_config(mut self, config: SynthesisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    /// Fields whose values are inserted byte-for-byte and must survive rewrites.
    pub fn with_critical_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.critical_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Take the critical fields from a schema.
    pub fn for_schema(self, schema: &FieldSchema) -> Self {
        let critical: Vec<String> = schema.critical_names().into_iter().map(str::to_string).collect();
        self.with_critical_fields(critical)
    }

    /// Produce one slot per rule.
    pub async fn synthesize(
        &self,
        values: &ExtractedValues,
        rules: &GenerationRules,
    ) -> SynthesizedContent {
        let critical: BTreeSet<&str> = self.critical_fields.iter().map(String::as_str).collect();
        let limit = self.config.max_concurrency.max(1);

        let slots: Vec<SynthesizedSlot> = stream::iter(rules.rules())
            .map(|rule| self.synthesize_slot(rule, values, &critical))
            .buffered(limit)
            .collect()
            .await;

        let ai = slots.iter().filter(|s| s.origin == SlotSource::Ai).count();
        tracing::info!(
            backend = %self.backend.name(),
            slots = slots.len(),
            ai = ai,
            fixed = slots.len() - ai,
            "Synthesis complete"
        );

        slots.into_iter().map(|s| (s.slot.clone(), s)).collect()
    }

    async fn synthesize_slot(
        &self,
        rule: &GenerationRule,
        values: &ExtractedValues,
        critical: &BTreeSet<&str>,
    ) -> SynthesizedSlot {
        let mut fixed = rule.render_fixed(values, critical);
        if rule.fixed || fixed.text.is_empty() {
            return fixed;
        }
        if self.breaker.is_open(BackendStage::Synthesis) {
            fixed
                .warnings
                .push("synthesis circuit open; fixed phrasing used".to_string());
            return fixed;
        }

        let keep: Vec<(String, String)> = fixed.critical_sources(values, critical);
        let keep_values: Vec<String> = keep.iter().map(|(_, v)| v.clone()).collect();
        let instruction = prompts::synthesis_instruction(rule, &fixed.text, &keep_values);

        let outcome = tokio::time::timeout(
            self.config.call_timeout,
            self.backend.ask(&fixed.text, &instruction),
        )
        .await;

        let answer = match outcome {
            Ok(Ok(answer)) => {
                self.breaker.record_success(BackendStage::Synthesis);
                answer
            }
            Ok(Err(BackendError::NotConfigured)) => return fixed,
            Ok(Err(BackendError::Malformed(reason))) => {
                fixed
                    .warnings
                    .push(format!("malformed rewrite ({}); fixed phrasing used", reason));
                return fixed;
            }
            Ok(Err(e)) => {
                self.breaker.record_failure(BackendStage::Synthesis);
                tracing::warn!(slot = %rule.slot, error = %e, "Rewrite failed, using fixed phrasing");
                fixed.warnings.push(format!("{}; fixed phrasing used", e));
                return fixed;
            }
            Err(_) => {
                self.breaker.record_failure(BackendStage::Synthesis);
                tracing::warn!(slot = %rule.slot, timeout = ?self.config.call_timeout, "Rewrite timed out");
                fixed.warnings.push(format!(
                    "rewrite timed out after {:?}; fixed phrasing used",
                    self.config.call_timeout
                ));
                return fixed;
            }
        };

        let rewrite = normalize_whitespace(&answer.value);
        if rewrite.is_empty() {
            fixed
                .warnings
                .push("empty rewrite; fixed phrasing used".to_string());
            return fixed;
        }

        let dropped: Vec<&str> = keep
            .iter()
            .filter(|(_, value)| !rewrite.contains(value.as_str()))
            .map(|(field, _)| field.as_str())
            .collect();
        if !dropped.is_empty() {
            tracing::warn!(slot = %rule.slot, dropped = ?dropped, "Rewrite lost critical values");
            fixed.warnings.push(format!(
                "rewrite altered critical value(s) of {}; fixed phrasing used",
                dropped.join(", ")
            ));
            return fixed;
        }

        SynthesizedSlot {
            text: rewrite,
            origin: SlotSource::Ai,
            ..fixed
        }
    }
}
