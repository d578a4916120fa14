//! Provider API keys.
//!
//! A key is wrapped in a [`SecretString`] as soon as it is read and is
//! only unwrapped to set a request header. Blank keys are refused at
//! load time, so a provider that exists always has something to send.

use super::ProviderError;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Where a key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Passed in by the caller
    Explicit,
    /// Provider section of the config
    Config,
    /// Environment variable
    Environment,
}

pub struct ApiKey {
    secret: SecretString,
    source: KeySource,
}

impl ApiKey {
    pub fn explicit(key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::checked(key.into(), KeySource::Explicit)
            .ok_or_else(|| ProviderError::NotConfigured("API key is blank".to_string()))
    }

    /// Use `configured` when it is set and non-blank, else read `env_var`.
    pub fn resolve(configured: Option<&str>, env_var: &str) -> Result<Self, ProviderError> {
        configured
            .and_then(|key| Self::checked(key.to_string(), KeySource::Config))
            .or_else(|| {
                std::env::var(env_var)
                    .ok()
                    .and_then(|key| Self::checked(key, KeySource::Environment))
            })
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "no API key: set 'api_key' in config or the {} environment variable",
                    env_var
                ))
            })
    }

    fn checked(key: String, source: KeySource) -> Option<Self> {
        if key.trim().is_empty() {
            return None;
        }
        Some(Self {
            secret: SecretString::from(key),
            source,
        })
    }

    /// The raw key. Call only where it is sent.
    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }

    pub fn source(&self) -> KeySource {
        self.source
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({:?}, [REDACTED])", self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNSET: &str = "DISTILL_TEST_KEY_NEVER_SET";

    #[test]
    fn test_debug_is_redacted() {
        let key = ApiKey::explicit("sk-distill-test-0000").unwrap();
        let debug = format!("{:?}", key);
        assert_eq!(debug, "ApiKey(Explicit, [REDACTED])");
        assert_eq!(key.expose(), "sk-distill-test-0000");
    }

    #[test]
    fn test_config_key_preferred() {
        let key = ApiKey::resolve(Some("from-config"), UNSET).unwrap();
        assert_eq!(key.source(), KeySource::Config);
        assert_eq!(key.expose(), "from-config");
    }

    #[test]
    fn test_blank_keys_are_not_configured() {
        assert!(matches!(ApiKey::explicit("  "), Err(ProviderError::NotConfigured(_))));
        assert!(matches!(
            ApiKey::resolve(Some(""), UNSET),
            Err(ProviderError::NotConfigured(_))
        ));
        assert!(matches!(ApiKey::resolve(None, UNSET), Err(ProviderError::NotConfigured(_))));
    }
}
