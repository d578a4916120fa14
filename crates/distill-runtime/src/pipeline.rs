//! One request end to end: extract, synthesize, render, validate.
//!
//! The stages run strictly in that order over a single
//! [`GenerationContext`]. Rendering is delegated to a caller-supplied
//! [`TemplateRenderer`]. Validation is synchronous and runs after the last
//! await, so dropping a request future part-way never touches the
//! consistency tracker.

use crate::backend::{IntelligentBackend, LlmBackend, NullBackend};
use crate::cache::CachedBackend;
use crate::config::{ConfigLoadError, RuntimeConfig};
use crate::extraction::{ExtractionEngine, ExtractionSummary};
use crate::generation::GenerationEngine;
use crate::providers::LlmProvider;
use crate::resilience::CircuitBreaker;
use async_trait::async_trait;
use distill_core::{
    ConsistencyTracker, CriticalValue, ExtractionError, FieldSchema, GenerationContext,
    GenerationRules, ValidationOrchestrator, ValidationReport,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors from the external templating engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("Rendering failed: {0}")]
    Failed(String),
}

/// The templating engine, provided by the caller.
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn render(
        &self,
        template_id: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<String, RenderError>;
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Input for one run.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub document_text: String,
    pub document_type: String,
    pub template_id: String,
    /// Overrides for the render map
    pub parameters: BTreeMap<String, String>,
    pub expected_section_count: usize,
    /// Critical values beyond those implied by the schema
    pub critical_values: Vec<CriticalValue>,
}

impl GenerationRequest {
    pub fn new(
        document_text: impl Into<String>,
        document_type: impl Into<String>,
        template_id: impl Into<String>,
        expected_section_count: usize,
    ) -> Self {
        Self {
            document_text: document_text.into(),
            document_type: document_type.into(),
            template_id: template_id.into(),
            parameters: BTreeMap::new(),
            expected_section_count,
            critical_values: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_critical_value(mut self, value: CriticalValue) -> Self {
        self.critical_values.push(value);
        self
    }
}

/// Result of one run. Data-quality problems live in the report, never in an error.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub context: GenerationContext,
    pub report: ValidationReport,
    pub extraction: ExtractionSummary,
}

pub struct Pipeline {
    schema: Arc<FieldSchema>,
    rules: Arc<GenerationRules>,
    extraction: ExtractionEngine,
    generation: GenerationEngine,
    validator: ValidationOrchestrator,
    renderer: Arc<dyn TemplateRenderer>,
}

impl Pipeline {
    pub fn builder(
        schema: Arc<FieldSchema>,
        rules: Arc<GenerationRules>,
        renderer: Arc<dyn TemplateRenderer>,
    ) -> PipelineBuilder {
        PipelineBuilder {
            schema,
            rules,
            renderer,
            provider: None,
            backend: None,
            config: RuntimeConfig::default(),
            tracker: None,
            breaker: None,
        }
    }

    pub fn schema(&self) -> &Arc<FieldSchema> {
        &self.schema
    }

    pub fn validator(&self) -> &ValidationOrchestrator {
        &self.validator
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        self.extraction.circuit_breaker()
    }

    pub async fn run(&self, request: GenerationRequest) -> Result<PipelineOutcome, PipelineError> {
        let mut context = GenerationContext::new(
            request.document_text,
            request.document_type,
            request.template_id,
        );
        for (key, value) in request.parameters {
            context.set_parameter(key, value);
        }

        let extracted = self
            .extraction
            .extract(context.document_text(), &self.schema)
            .await?;
        let extraction = ExtractionSummary::of(&extracted);
        context.set_extracted(extracted);
        context.declare_critical_from(&self.schema);
        for value in request.critical_values {
            context.add_critical_value(value);
        }

        let synthesized = self
            .generation
            .synthesize(context.extracted(), &self.rules)
            .await;
        context.set_synthesized(synthesized);

        let rendered = self
            .renderer
            .render(context.template_id(), &context.render_map())
            .await?;
        context.set_rendered(rendered);

        // No awaits past this point
        let report = self.validator.validate(
            &context,
            &context.critical_values(),
            request.expected_section_count,
        );
        context.record_validation(&report);

        Ok(PipelineOutcome {
            context,
            report,
            extraction,
        })
    }
}

pub struct PipelineBuilder {
    schema: Arc<FieldSchema>,
    rules: Arc<GenerationRules>,
    renderer: Arc<dyn TemplateRenderer>,
    provider: Option<Arc<dyn LlmProvider>>,
    backend: Option<Arc<dyn IntelligentBackend>>,
    config: RuntimeConfig,
    tracker: Option<Arc<ConsistencyTracker>>,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl PipelineBuilder {
    /// Use one backend for both extraction and synthesis.
    pub fn backend(mut self, backend: Arc<dyn IntelligentBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Build extraction and synthesis backends over an LLM provider,
    /// using the `llm` section of the config.
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to the process-wide tracker.
    pub fn tracker(mut self, tracker: Arc<ConsistencyTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn build(self) -> Result<Pipeline, ConfigLoadError> {
        self.config.check()?;

        let (extraction_backend, synthesis_backend): (
            Arc<dyn IntelligentBackend>,
            Arc<dyn IntelligentBackend>,
        ) = match (self.backend, self.provider) {
            (Some(backend), _) => (backend.clone(), backend),
            (None, Some(provider)) => (
                Arc::new(LlmBackend::for_extraction(provider.clone(), self.config.llm.clone())),
                Arc::new(LlmBackend::for_synthesis(provider, self.config.llm.clone())),
            ),
            (None, None) => (Arc::new(NullBackend), Arc::new(NullBackend)),
        };

        let breaker = self
            .breaker
            .unwrap_or_else(|| Arc::new(CircuitBreaker::new(self.config.circuit_breaker.clone())));

        let extraction =
            ExtractionEngine::new(CachedBackend::wrap(extraction_backend, &self.config.cache))
                .with_config(self.config.extraction.clone())
                .with_circuit_breaker(breaker.clone());

        let generation =
            GenerationEngine::new(CachedBackend::wrap(synthesis_backend, &self.config.cache))
                .with_config(self.config.synthesis.clone())
                .with_circuit_breaker(breaker)
                .for_schema(&self.schema);

        let mut validator =
            ValidationOrchestrator::new(self.schema.clone(), self.config.validation.clone())?;
        if let Some(tracker) = self.tracker {
            validator = validator.with_tracker(tracker);
        }

        tracing::debug!(
            fields = self.schema.len(),
            slots = self.rules.len(),
            "Pipeline built"
        );

        Ok(Pipeline {
            schema: self.schema,
            rules: self.rules,
            extraction,
            generation,
            validator,
            renderer: self.renderer,
        })
    }
}
