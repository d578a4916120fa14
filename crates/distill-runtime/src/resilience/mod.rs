//! Resilience for backend calls.
//!
//! - A circuit breaker per stage, so a failing backend is skipped
//!   instead of timing out field after field
//! - Per-call deadlines, applied by the engines with `tokio::time::timeout`
//! - Backoff retries of transient provider errors, inside [`LlmBackend`](crate::backend::LlmBackend)

mod circuit_breaker;

pub use circuit_breaker::{BackendStage, CircuitBreaker, CircuitBreakerConfig, CircuitState};
