//! Chat-completion providers behind the LLM backend.
//!
//! [`LlmBackend`](crate::backend::LlmBackend) speaks to any [`LlmProvider`].
//! Concrete providers are feature-gated so a deterministic-only build pulls
//! in no HTTP stack.
//!
//! ## Security
//!
//! Providers hold keys as [`ApiKey`]s, which never print their value.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod api_key;

#[cfg(feature = "anthropic")]
mod anthropic;

pub use api_key::{ApiKey, KeySource};

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicProvider, ANTHROPIC_API_KEY_ENV};

/// Errors from LLM providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Transport failure before a response arrived
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// 429, with the server's `retry-after` when given
    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Non-success status other than 401 and 429
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("JSON parse error: {0}")]
    ParseError(String),

    /// Key rejected by the provider
    #[error("Authentication failed")]
    AuthError,

    /// No response within the configured timeout
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// Missing key or bad provider settings. Never retried
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Failures worth another attempt after a short wait.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::HttpError(_) | ProviderError::RateLimited { .. } => true,
            ProviderError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Settings for one completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub model: String,

    pub max_tokens: u32,

    /// 0.0 keeps extraction answers reproducible
    pub temperature: f32,

    #[serde(with = "crate::config::humantime_duration")]
    pub timeout: Duration,

    /// Mark prompts cacheable (Anthropic-specific)
    pub prompt_caching: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5-20250514".to_string(),
            max_tokens: 500,
            temperature: 0.0,
            timeout: Duration::from_secs(15),
            prompt_caching: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A chat message for LLM completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Response from an LLM completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub model: String,
    pub stop_reason: Option<String>,
}

/// Token usage from a completion.
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    /// Tokens read from the provider's prompt cache
    pub cache_read_tokens: u32,
    /// Tokens written to the provider's prompt cache
    pub cache_creation_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A chat-completion service.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Cheap readiness check; makes no request.
    async fn health_check(&self) -> bool;

    fn name(&self) -> &str;

    /// Rough token count, about four characters per token.
    fn estimate_tokens(&self, text: &str) -> u32 {
        (text.len() / 4) as u32
    }
}
