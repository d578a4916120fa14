//! Runtime configuration.
//!
//! Every section has defaults, so an empty YAML document is a valid
//! configuration. Durations are written in human form (`"15s"`, `"2m"`).
//!
//! ```yaml
//! extraction:
//!   max_concurrency: 8
//!   call_timeout: 45s
//! circuit_breaker:
//!   failure_threshold: 5
//!   recovery_timeout: 1m
//! validation:
//!   cv_target: 12.5
//! ```

use crate::cache::CacheConfig;
use crate::providers::CompletionConfig;
use crate::resilience::CircuitBreakerConfig;
use distill_core::ValidationConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors loading runtime configuration.
#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid validation settings: {0}")]
    Validation(#[from] distill_core::ConfigError),

    #[error("Invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Serde adapter for human-readable durations.
pub mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Fields extracted at once for one document
    pub max_concurrency: usize,

    /// Deadline for a single backend call
    #[serde(with = "humantime_duration")]
    pub call_timeout: Duration,

    /// Extra backend attempts, with a stricter instruction, after a
    /// rejected or timed-out answer
    pub max_retries: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            call_timeout: Duration::from_secs(60),
            max_retries: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    #[serde(with = "humantime_duration")]
    pub call_timeout: Duration,

    /// Slots rewritten at once
    pub max_concurrency: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            max_concurrency: 4,
        }
    }
}

/// Everything the runtime can be configured with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub extraction: ExtractionConfig,
    pub synthesis: SynthesisConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub cache: CacheConfig,
    pub llm: CompletionConfig,
    pub validation: ValidationConfig,
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.check()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Reject settings that would stall or disable the engines.
    pub fn check(&self) -> Result<(), ConfigLoadError> {
        if self.extraction.max_concurrency == 0 {
            return Err(ConfigLoadError::Invalid {
                name: "extraction.max_concurrency",
                reason: "must be at least 1".into(),
            });
        }
        if self.synthesis.max_concurrency == 0 {
            return Err(ConfigLoadError::Invalid {
                name: "synthesis.max_concurrency",
                reason: "must be at least 1".into(),
            });
        }
        if self.extraction.call_timeout.is_zero() || self.synthesis.call_timeout.is_zero() {
            return Err(ConfigLoadError::Invalid {
                name: "call_timeout",
                reason: "must be non-zero".into(),
            });
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigLoadError::Invalid {
                name: "circuit_breaker.failure_threshold",
                reason: "must be at least 1".into(),
            });
        }
        self.validation.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = RuntimeConfig::from_yaml("{}").unwrap();
        assert_eq!(config.extraction, ExtractionConfig::default());
        assert_eq!(config.extraction.call_timeout, Duration::from_secs(60));
        assert_eq!(config.circuit_breaker.failure_threshold, 3);
    }

    #[test]
    fn test_human_durations() {
        let yaml = r#"
extraction:
  max_concurrency: 8
  call_timeout: 1m 30s
circuit_breaker:
  recovery_timeout: 2m
cache:
  ttl: 10m
"#;
        let config = RuntimeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.extraction.max_concurrency, 8);
        assert_eq!(config.extraction.call_timeout, Duration::from_secs(90));
        assert_eq!(config.extraction.max_retries, 1);
        assert_eq!(config.circuit_breaker.recovery_timeout, Duration::from_secs(120));
        assert_eq!(config.cache.ttl, Duration::from_secs(600));
    }

    #[test]
    fn test_bad_duration_is_yaml_error() {
        let result = RuntimeConfig::from_yaml("extraction:\n  call_timeout: soon\n");
        assert!(matches!(result, Err(ConfigLoadError::YamlError(_))));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result = RuntimeConfig::from_yaml("extraction:\n  max_concurrency: 0\n");
        assert!(matches!(
            result,
            Err(ConfigLoadError::Invalid { name: "extraction.max_concurrency", .. })
        ));
    }

    #[test]
    fn test_validation_section_is_checked() {
        let result = RuntimeConfig::from_yaml("validation:\n  denylist_patterns: ['(']\n");
        assert!(matches!(result, Err(ConfigLoadError::Validation(_))));
    }

    #[test]
    fn test_durations_serialize_in_human_form() {
        let yaml = serde_yaml::to_string(&ExtractionConfig::default()).unwrap();
        assert!(yaml.contains("call_timeout: 1m"));
    }
}
