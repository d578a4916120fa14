//! Anthropic Messages API provider.
//!
//! ## Security
//!
//! The key lives in an [`ApiKey`] and is exposed only when the
//! `x-api-key` header is set.

use super::{
    api_key::ApiKey, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider,
    ProviderError, Role, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// Environment variable holding the Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    key: ApiKey,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("key", &self.key)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_key(ApiKey::explicit(api_key)?)
    }

    /// Read the key from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self, ProviderError> {
        Self::with_key(ApiKey::resolve(None, ANTHROPIC_API_KEY_ENV)?)
    }

    /// Build from a JSON provider section (`api_key`, `base_url`), falling
    /// back to the environment for the key.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let key = ApiKey::resolve(
            config.get("api_key").and_then(JsonValue::as_str),
            ANTHROPIC_API_KEY_ENV,
        )?;
        let provider = Self::with_key(key)?;
        match config.get("base_url").and_then(JsonValue::as_str) {
            Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => Err(
                ProviderError::NotConfigured("base_url must start with http:// or https://".into()),
            ),
            Some(url) => Ok(provider.with_base_url(url)),
            None => Ok(provider),
        }
    }

    fn with_key(key: ApiKey) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;
        Ok(Self {
            key,
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<Vec<ContentBlock>>,
    messages: Vec<AnthropicMessage>,
    /// Always sent; the API default is 1.0
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
}

#[derive(Debug, Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    type_: &'static str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlockResponse>,
    model: String,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlockResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
    #[serde(default)]
    cache_creation_input_tokens: u32,
    #[serde(default)]
    cache_read_input_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

fn text_block(text: String, cached: bool) -> ContentBlock {
    ContentBlock::Text {
        text,
        cache_control: cached.then_some(CacheControl { type_: "ephemeral" }),
    }
}

/// Split out the system prompt and convert the rest to API messages.
///
/// The system prompt and the first user turn (which carries the document)
/// are the stable prefix across a document's fields, so only they are
/// marked cacheable.
fn build_request(messages: Vec<ChatMessage>, config: &CompletionConfig) -> AnthropicRequest {
    let mut system = None;
    let mut api_messages = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => system = Some(vec![text_block(msg.content, config.prompt_caching)]),
            role => {
                let cached = config.prompt_caching && api_messages.is_empty();
                api_messages.push(AnthropicMessage {
                    role: role.as_str(),
                    content: vec![text_block(msg.content, cached)],
                });
            }
        }
    }

    AnthropicRequest {
        model: config.model.clone(),
        max_tokens: config.max_tokens,
        system,
        messages: api_messages,
        temperature: config.temperature,
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = build_request(messages, config);

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.key.expose())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(config.timeout)
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::AuthError);
        }

        if !status.is_success() {
            let message = match response.json::<AnthropicError>().await {
                Ok(body) => body.error.message,
                Err(e) => format!("unreadable error body: {}", e),
            };
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let content = body
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        tracing::debug!(
            model = %body.model,
            input_tokens = body.usage.input_tokens,
            output_tokens = body.usage.output_tokens,
            cache_read = body.usage.cache_read_input_tokens,
            "Anthropic completion"
        );

        Ok(CompletionResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: body.usage.input_tokens,
                completion_tokens: body.usage.output_tokens,
                cache_read_tokens: body.usage.cache_read_input_tokens,
                cache_creation_tokens: body.usage.cache_creation_input_tokens,
            },
            model: body.model,
            stop_reason: body.stop_reason,
        })
    }

    async fn health_check(&self) -> bool {
        // Blank keys are refused at construction
        true
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::KeySource;

    #[test]
    fn test_key_not_in_debug_output() {
        let secret = "sk-ant-REDACTED";
        let provider = AnthropicProvider::new(secret).unwrap();
        let debug = format!("{:?}", provider);
        assert!(!debug.contains(secret));
        assert!(debug.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_blank_key_is_refused() {
        assert!(AnthropicProvider::new("key").unwrap().health_check().await);
        assert!(matches!(
            AnthropicProvider::new(""),
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_from_config() {
        let config = serde_json::json!({
            "api_key": "config-key",
            "base_url": "https://proxy.internal/v1"
        });
        let provider = AnthropicProvider::from_config(&config).unwrap();
        assert_eq!(provider.base_url, "https://proxy.internal/v1");
        assert_eq!(provider.key.source(), KeySource::Config);

        let bad = serde_json::json!({ "api_key": "k", "base_url": "proxy" });
        assert!(AnthropicProvider::from_config(&bad).is_err());
    }

    #[test]
    fn test_request_splits_system_prompt() {
        let config = CompletionConfig::default();
        let request = build_request(
            vec![
                ChatMessage::system("be terse"),
                ChatMessage::user("document"),
                ChatMessage::user("question"),
            ],
            &config,
        );
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["system"][0]["text"], "be terse");
        assert_eq!(json["messages"].as_array().unwrap().len(), 2);
        assert_eq!(json["messages"][0]["content"][0]["cache_control"]["type"], "ephemeral");
        assert!(json["messages"][1]["content"][0].get("cache_control").is_none());
        assert_eq!(json["temperature"], 0.0);
    }

    #[test]
    fn test_temperature_is_always_sent() {
        let config = CompletionConfig {
            temperature: 0.5,
            ..Default::default()
        };
        let request = build_request(vec![ChatMessage::user("question")], &config);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["temperature"], 0.5);
    }
}
