//! The intelligent backend over a chat-completion provider.

use super::{BackendAnswer, BackendError, IntelligentBackend};
use crate::prompts::{EXTRACTION_SYSTEM_PROMPT, SYNTHESIS_SYSTEM_PROMPT};
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

lazy_static! {
    // First `{` to last `}`; models sometimes wrap the object in prose or fences
    static ref JSON_OBJECT: Regex = Regex::new(r"(?s)\{.*\}").unwrap();
}

impl From<ProviderError> for BackendError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Timeout(after) => BackendError::Timeout(after),
            ProviderError::NotConfigured(_) => BackendError::NotConfigured,
            ProviderError::ParseError(msg) => BackendError::Malformed(msg),
            other => BackendError::Unavailable(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAnswer {
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    value: JsonValue,
    #[serde(default)]
    evidence: Option<String>,
}

/// Read the `{"reasoning", "value", "evidence"}` object out of a completion.
pub(crate) fn parse_answer(content: &str) -> Result<BackendAnswer, BackendError> {
    let object = JSON_OBJECT
        .find(content)
        .ok_or_else(|| BackendError::Malformed("no JSON object in response".to_string()))?;

    let raw: RawAnswer = serde_json::from_str(object.as_str())
        .map_err(|e| BackendError::Malformed(e.to_string()))?;

    let value = match raw.value {
        JsonValue::String(s) => s,
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Null => String::new(),
        other => {
            return Err(BackendError::Malformed(format!(
                "value must be a string, number or boolean, got {}",
                other
            )))
        }
    };

    Ok(BackendAnswer {
        value,
        rationale: raw.reasoning,
        evidence: raw.evidence.filter(|e| !e.trim().is_empty()),
    })
}

/// [`IntelligentBackend`] that asks an [`LlmProvider`].
///
/// Transient provider errors (rate limits, transport failures, 5xx) are
/// retried with exponential backoff. The caller's per-call timeout bounds
/// the whole exchange, retries included.
pub struct LlmBackend {
    provider: Arc<dyn LlmProvider>,
    completion: CompletionConfig,
    system_prompt: String,
    backoff: ExponentialBuilder,
}

impl LlmBackend {
    /// Backend that answers extraction questions.
    pub fn for_extraction(provider: Arc<dyn LlmProvider>, completion: CompletionConfig) -> Self {
        Self::new(provider, completion, EXTRACTION_SYSTEM_PROMPT)
    }

    /// Backend that rewrites generated phrases.
    pub fn for_synthesis(provider: Arc<dyn LlmProvider>, completion: CompletionConfig) -> Self {
        Self::new(provider, completion, SYNTHESIS_SYSTEM_PROMPT)
    }

    /// Backend with a custom system prompt. Transient provider errors are
    /// retried three times with exponential backoff.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        completion: CompletionConfig,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            completion,
            system_prompt: system_prompt.into(),
            backoff: ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(500))
                .with_max_delay(Duration::from_secs(8))
                .with_max_times(3),
        }
    }

    /// Replace the retry policy for transient provider errors.
    pub fn with_backoff(mut self, backoff: ExponentialBuilder) -> Self {
        self.backoff = backoff;
        self
    }

    fn messages(&self, text: &str, instruction: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_prompt.trim()),
            ChatMessage::user(format!("<document>\n{}\n</document>", text)),
            ChatMessage::user(instruction),
        ]
    }
}

#[async_trait]
impl IntelligentBackend for LlmBackend {
    async fn ask(&self, text: &str, instruction: &str) -> Result<BackendAnswer, BackendError> {
        let messages = &self.messages(text, instruction);
        let provider = &self.provider;
        let completion = &self.completion;

        let response = (|| async move { provider.complete(messages.clone(), completion).await })
        .retry(self.backoff.clone())
        .when(ProviderError::is_transient)
        .notify(|err: &ProviderError, wait: Duration| {
            tracing::warn!(
                provider = %self.provider.name(),
                error = %err,
                wait = ?wait,
                "Transient provider error, retrying"
            );
        })
        .await?;

        tracing::debug!(
            provider = %self.provider.name(),
            model = %response.model,
            tokens = response.usage.total(),
            "Backend answered"
        );

        parse_answer(&response.content)
    }

    fn name(&self) -> &str {
        self.provider.name()
    }
}
