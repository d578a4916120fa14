//! Circuit breaker around the intelligent backend.
//!
//! When backend calls fail repeatedly the circuit opens, and the engines
//! go straight to their deterministic paths until the recovery timeout
//! has passed.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// The pipeline stage a backend call belongs to.
///
/// Each stage has its own circuit, so a backend that cannot phrase slots
/// does not stop it from answering extraction questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendStage {
    Extraction,
    Synthesis,
}

impl fmt::Display for BackendStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendStage::Extraction => write!(f, "extraction"),
            BackendStage::Synthesis => write!(f, "synthesis"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,

    /// Time an open circuit waits before letting a test call through
    #[serde(with = "crate::config::humantime_duration")]
    pub recovery_timeout: Duration,

    /// Successes in half-open state needed to close
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CircuitState {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { successes: u32 },
}

pub struct CircuitBreaker {
    states: RwLock<HashMap<BackendStage, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// True when calls for `stage` should skip the backend.
    pub fn is_open(&self, stage: BackendStage) -> bool {
        let states = self.states.read();
        match states.get(&stage) {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    drop(states);
                    self.transition_to_half_open(stage);
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    pub fn record_success(&self, stage: BackendStage) {
        let mut states = self.states.write();
        match states.get(&stage).cloned() {
            Some(CircuitState::HalfOpen { successes }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(stage, CircuitState::Closed { failures: 0 });
                    tracing::info!(stage = %stage, "Circuit closed after successful recovery");
                } else {
                    states.insert(
                        stage,
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { failures }) if failures > 0 => {
                states.insert(stage, CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    pub fn record_failure(&self, stage: BackendStage) {
        let mut states = self.states.write();
        let failures = match states.get(&stage) {
            Some(CircuitState::Closed { failures }) => *failures + 1,
            None => 1,
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(
                    stage,
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::warn!(stage = %stage, "Circuit reopened after failed recovery attempt");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
        };

        if failures >= self.config.failure_threshold {
            states.insert(
                stage,
                CircuitState::Open {
                    opened_at: Instant::now(),
                },
            );
            tracing::warn!(
                stage = %stage,
                failures = failures,
                "Circuit opened after repeated backend failures"
            );
        } else {
            states.insert(stage, CircuitState::Closed { failures });
        }
    }

    fn transition_to_half_open(&self, stage: BackendStage) {
        let mut states = self.states.write();
        if matches!(states.get(&stage), Some(CircuitState::Open { .. })) {
            states.insert(stage, CircuitState::HalfOpen { successes: 0 });
            tracing::info!(stage = %stage, "Circuit half-open, allowing a test call");
        }
    }

    pub fn state(&self, stage: BackendStage) -> CircuitState {
        self.states
            .read()
            .get(&stage)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    /// Close every circuit.
    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("states", &*self.states.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::default();
        assert!(!cb.is_open(BackendStage::Extraction));
        assert_eq!(
            cb.state(BackendStage::Extraction),
            CircuitState::Closed { failures: 0 }
        );
    }

    #[test]
    fn test_circuit_opens_after_failures() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        });

        cb.record_failure(BackendStage::Extraction);
        assert!(!cb.is_open(BackendStage::Extraction));

        cb.record_failure(BackendStage::Extraction);
        assert!(cb.is_open(BackendStage::Extraction));
    }

    #[test]
    fn test_success_resets_failures() {
        let cb = CircuitBreaker::default();

        cb.record_failure(BackendStage::Extraction);
        cb.record_failure(BackendStage::Extraction);
        cb.record_success(BackendStage::Extraction);

        cb.record_failure(BackendStage::Extraction);
        cb.record_failure(BackendStage::Extraction);
        assert!(!cb.is_open(BackendStage::Extraction));
    }

    #[test]
    fn test_stages_are_independent() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });

        cb.record_failure(BackendStage::Synthesis);
        assert!(cb.is_open(BackendStage::Synthesis));
        assert!(!cb.is_open(BackendStage::Extraction));
    }

    #[test]
    fn test_recovery_through_half_open() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::ZERO,
            success_threshold: 2,
        });

        cb.record_failure(BackendStage::Extraction);
        // Zero recovery timeout: the next check moves to half-open
        assert!(!cb.is_open(BackendStage::Extraction));
        assert_eq!(
            cb.state(BackendStage::Extraction),
            CircuitState::HalfOpen { successes: 0 }
        );

        cb.record_success(BackendStage::Extraction);
        cb.record_success(BackendStage::Extraction);
        assert_eq!(
            cb.state(BackendStage::Extraction),
            CircuitState::Closed { failures: 0 }
        );
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::ZERO,
            success_threshold: 2,
        });

        cb.record_failure(BackendStage::Extraction);
        assert!(!cb.is_open(BackendStage::Extraction));
        cb.record_failure(BackendStage::Extraction);
        assert!(matches!(
            cb.state(BackendStage::Extraction),
            CircuitState::Open { .. }
        ));
    }

    #[test]
    fn test_reset_closes_everything() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        cb.record_failure(BackendStage::Extraction);
        cb.record_failure(BackendStage::Synthesis);
        cb.reset();
        assert!(!cb.is_open(BackendStage::Extraction));
        assert!(!cb.is_open(BackendStage::Synthesis));
    }
}
