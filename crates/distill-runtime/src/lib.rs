//! # distill-runtime
//!
//! Async, backend-assisted stages for Distill.
//!
//! `distill-core` is deterministic and never calls a backend. This crate
//! adds the parts that do:
//! - [`ExtractionEngine`]: backend first, stricter retry, then the core's
//!   pattern fallback and defaults
//! - [`GenerationEngine`]: optional rewrites of fixed phrasing that must
//!   keep critical values verbatim
//! - [`Pipeline`]: one request through extract, synthesize, render and validate
//!
//! Backends are interchangeable behind [`IntelligentBackend`]. With none
//! configured the engines behave exactly like the deterministic core.
//!
//! ## Example
//!
//! ```rust,ignore
//! use distill_runtime::{GenerationRequest, Pipeline, RuntimeConfig};
//!
//! let pipeline = Pipeline::builder(schema, rules, renderer)
//!     .provider(Arc::new(AnthropicProvider::from_env()?))
//!     .config(RuntimeConfig::from_yaml_file("distill.yaml")?)
//!     .build()?;
//!
//! let outcome = pipeline
//!     .run(GenerationRequest::new(text, "informed_consent", "short_form", 5))
//!     .await?;
//! if !outcome.report.passed {
//!     for issue in &outcome.report.issues {
//!         eprintln!("{}", issue.message);
//!     }
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod evidence;
pub mod extraction;
pub mod generation;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod resilience;

pub use backend::{BackendAnswer, BackendError, IntelligentBackend, LlmBackend, NullBackend};
pub use cache::{CacheConfig, CachedBackend};
pub use config::{ConfigLoadError, ExtractionConfig, RuntimeConfig, SynthesisConfig};
pub use extraction::{ExtractionEngine, ExtractionSummary};
pub use generation::GenerationEngine;
pub use pipeline::{
    GenerationRequest, Pipeline, PipelineBuilder, PipelineError, PipelineOutcome, RenderError,
    TemplateRenderer,
};
pub use providers::{LlmProvider, ProviderError};
pub use resilience::{BackendStage, CircuitBreaker, CircuitBreakerConfig, CircuitState};

pub use distill_core::ExtractionError;
