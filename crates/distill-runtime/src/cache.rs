//! Answer cache for the intelligent backend.
//!
//! [`CachedBackend`] wraps any backend and memoizes successful answers,
//! keyed by the text and the instruction. Re-running a document through
//! the same schema then costs no backend calls. Errors are never cached.

use crate::backend::{BackendAnswer, BackendError, IntelligentBackend};
use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: u64,
    #[serde(with = "crate::config::humantime_duration")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Cache key: hashes of the text and the instruction.
#[derive(Clone, Copy, Debug)]
pub struct AnswerKey {
    text_hash: u64,
    instruction_hash: u64,
}

impl AnswerKey {
    pub fn new(text: &str, instruction: &str) -> Self {
        Self {
            text_hash: hash_str(text),
            instruction_hash: hash_str(instruction),
        }
    }
}

impl Hash for AnswerKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text_hash.hash(state);
        self.instruction_hash.hash(state);
    }
}

impl PartialEq for AnswerKey {
    fn eq(&self, other: &Self) -> bool {
        self.text_hash == other.text_hash && self.instruction_hash == other.instruction_hash
    }
}

impl Eq for AnswerKey {}

fn hash_str(value: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Backend decorator that remembers successful answers.
pub struct CachedBackend {
    inner: Arc<dyn IntelligentBackend>,
    cache: Cache<AnswerKey, BackendAnswer>,
    name: String,
}

impl CachedBackend {
    pub fn new(inner: Arc<dyn IntelligentBackend>, config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.ttl)
            .build();
        let name = format!("cached({})", inner.name());
        Self { inner, cache, name }
    }

    /// Wrap `inner` when caching is enabled, otherwise return it unchanged.
    pub fn wrap(inner: Arc<dyn IntelligentBackend>, config: &CacheConfig) -> Arc<dyn IntelligentBackend> {
        if config.enabled {
            Arc::new(Self::new(inner, config))
        } else {
            inner
        }
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate number of cached answers.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl IntelligentBackend for CachedBackend {
    async fn ask(&self, text: &str, instruction: &str) -> Result<BackendAnswer, BackendError> {
        let key = AnswerKey::new(text, instruction);
        if let Some(answer) = self.cache.get(&key).await {
            tracing::trace!(backend = %self.inner.name(), "Answer cache hit");
            return Ok(answer);
        }

        let answer = self.inner.ask(text, instruction).await?;
        self.cache.insert(key, answer.clone()).await;
        Ok(answer)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingBackend {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl IntelligentBackend for CountingBackend {
        async fn ask(&self, _text: &str, instruction: &str) -> Result<BackendAnswer, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(BackendError::Unavailable("down".into()))
            } else {
                Ok(BackendAnswer::new(instruction.to_uppercase(), "echo"))
            }
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn counting(fail: bool) -> Arc<CountingBackend> {
        Arc::new(CountingBackend {
            calls: AtomicU32::new(0),
            fail,
        })
    }

    #[tokio::test]
    async fn test_repeated_question_hits_cache() {
        let inner = counting(false);
        let cached = CachedBackend::new(inner.clone(), &CacheConfig::default());

        let first = cached.ask("doc", "duration?").await.unwrap();
        let second = cached.ask("doc", "duration?").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        cached.ask("doc", "risks?").await.unwrap();
        cached.ask("other doc", "duration?").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
        assert_eq!(cached.name(), "cached(counting)");
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let inner = counting(true);
        let cached = CachedBackend::new(inner.clone(), &CacheConfig::default());

        assert!(cached.ask("doc", "q").await.is_err());
        assert!(cached.ask("doc", "q").await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_all_forces_refetch() {
        let inner = counting(false);
        let cached = CachedBackend::new(inner.clone(), &CacheConfig::default());

        cached.ask("doc", "q").await.unwrap();
        cached.invalidate_all();
        cached.ask("doc", "q").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_disabled_cache_returns_inner() {
        let inner: Arc<dyn IntelligentBackend> = counting(false);
        let config = CacheConfig {
            enabled: false,
            ..Default::default()
        };
        let wrapped = CachedBackend::wrap(inner, &config);
        assert_eq!(wrapped.name(), "counting");
    }

    #[test]
    fn test_key_equality() {
        assert_eq!(AnswerKey::new("a", "b"), AnswerKey::new("a", "b"));
        assert_ne!(AnswerKey::new("a", "b"), AnswerKey::new("b", "a"));
    }
}
