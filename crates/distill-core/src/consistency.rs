//! Run-to-run consistency tracking.
//!
//! The tracker keeps a bounded window of recent runs per
//! (document type, template) and is used to compute the coefficient of
//! variation (CV) of output word counts. A low CV means repeated
//! generations for the same kind of document come out about the same length.
//!
//! # Concurrency
//!
//! One tracker is shared by every concurrent validation. Appending a run
//! and reading its window happen under a single write lock, so two
//! validations of the same key never lose an entry or see a torn window.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Default number of runs kept per key.
pub const DEFAULT_WINDOW: usize = 50;

static GLOBAL_TRACKER: OnceLock<Arc<ConsistencyTracker>> = OnceLock::new();

/// Identifies a stream of comparable runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackerKey {
    pub document_type: String,
    pub template_id: String,
}

impl TrackerKey {
    pub fn new(document_type: impl Into<String>, template_id: impl Into<String>) -> Self {
        Self {
            document_type: document_type.into(),
            template_id: template_id.into(),
        }
    }
}

impl fmt::Display for TrackerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.document_type, self.template_id)
    }
}

/// Measurements from one validated run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSample {
    pub word_count: usize,
    pub section_count: usize,
    pub structural_hash: String,
    pub recorded_at: DateTime<Utc>,
}

impl RunSample {
    pub fn new(word_count: usize, section_count: usize, structural_hash: impl Into<String>) -> Self {
        Self {
            word_count,
            section_count,
            structural_hash: structural_hash.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Aggregate statistics for one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencySummary {
    pub runs_analyzed: usize,
    pub coefficient_of_variation: f64,
    pub mean_word_count: f64,
    pub std_word_count: f64,
    pub unique_structures: usize,
    /// 1.0 when every run has the same structure, falling toward 0 as structures diverge
    pub structural_consistency: f64,
    pub target_achieved: bool,
}

/// Bounded per-key history of recent runs.
pub struct ConsistencyTracker {
    windows: RwLock<HashMap<TrackerKey, VecDeque<RunSample>>>,
    capacity: usize,
}

impl ConsistencyTracker {
    /// Create a tracker that keeps `capacity` runs per key (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// The process-wide tracker.
    pub fn global() -> Arc<Self> {
        GLOBAL_TRACKER
            .get_or_init(|| Arc::new(Self::new(DEFAULT_WINDOW)))
            .clone()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a run and return the window including it.
    ///
    /// Oldest runs are dropped once the window is full.
    pub fn record(&self, key: &TrackerKey, sample: RunSample) -> Vec<RunSample> {
        let mut windows = self.windows.write();
        let window = windows.entry(key.clone()).or_default();
        window.push_back(sample);
        while window.len() > self.capacity {
            window.pop_front();
        }
        window.iter().cloned().collect()
    }

    /// Snapshot of the current window for a key.
    pub fn get_window(&self, key: &TrackerKey) -> Vec<RunSample> {
        self.windows
            .read()
            .get(key)
            .map(|w| w.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Forget every run for one key.
    pub fn reset(&self, key: &TrackerKey) {
        self.windows.write().remove(key);
    }

    /// Forget every run for every key.
    pub fn reset_all(&self) {
        self.windows.write().clear();
    }

    pub fn keys(&self) -> Vec<TrackerKey> {
        let mut keys: Vec<TrackerKey> = self.windows.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Statistics over the current window for a key.
    pub fn summary(&self, key: &TrackerKey, cv_target: f64) -> ConsistencySummary {
        summarize(&self.get_window(key), cv_target)
    }
}

impl Default for ConsistencyTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl fmt::Debug for ConsistencyTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsistencyTracker")
            .field("capacity", &self.capacity)
            .field("keys", &self.windows.read().len())
            .finish()
    }
}

/// Summarize a window of runs.
pub fn summarize(window: &[RunSample], cv_target: f64) -> ConsistencySummary {
    let counts = word_counts(window);
    let (mean, std) = mean_and_std(&counts);
    let cv = coefficient_of_variation(&counts);
    let unique = window
        .iter()
        .map(|s| s.structural_hash.as_str())
        .collect::<HashSet<_>>()
        .len();
    let structural_consistency = if window.is_empty() {
        1.0
    } else {
        1.0 - (unique.saturating_sub(1) as f64 / window.len() as f64)
    };

    ConsistencySummary {
        runs_analyzed: window.len(),
        coefficient_of_variation: cv,
        mean_word_count: mean,
        std_word_count: std,
        unique_structures: unique,
        structural_consistency,
        target_achieved: cv < cv_target,
    }
}

/// Word counts of a window as floats.
pub fn word_counts(window: &[RunSample]) -> Vec<f64> {
    window.iter().map(|s| s.word_count as f64).collect()
}

/// Population coefficient of variation, as a percentage.
///
/// Fewer than two samples, or a mean of zero, gives 0.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let (mean, std) = mean_and_std(values);
    if mean == 0.0 {
        return 0.0;
    }
    std / mean * 100.0
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Fingerprint of a document's shape: the ordered word counts of its sections.
///
/// Returns the first 16 hex characters of a SHA-256 digest.
pub fn structural_fingerprint(section_word_counts: &[usize]) -> String {
    let shape = section_word_counts
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join("|");
    let digest = Sha256::digest(shape.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key() -> TrackerKey {
        TrackerKey::new("informed_consent", "short_form_v1")
    }

    #[test]
    fn test_cv_identical_runs_is_zero() {
        assert_eq!(coefficient_of_variation(&[100.0, 100.0, 100.0]), 0.0);
    }

    #[test]
    fn test_cv_population_stddev() {
        let cv = coefficient_of_variation(&[80.0, 100.0, 120.0]);
        assert!((cv - 16.3299).abs() < 1e-3, "cv was {}", cv);
    }

    #[test]
    fn test_cv_degenerate_inputs() {
        assert_eq!(coefficient_of_variation(&[]), 0.0);
        assert_eq!(coefficient_of_variation(&[42.0]), 0.0);
        assert_eq!(coefficient_of_variation(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_window_is_bounded() {
        let tracker = ConsistencyTracker::new(3);
        for words in [10, 20, 30, 40, 50] {
            tracker.record(&key(), RunSample::new(words, 1, "h"));
        }
        let window = tracker.get_window(&key());
        assert_eq!(window.len(), 3);
        assert_eq!(
            window.iter().map(|s| s.word_count).collect::<Vec<_>>(),
            vec![30, 40, 50]
        );
    }

    #[test]
    fn test_record_returns_window_with_new_sample() {
        let tracker = ConsistencyTracker::new(10);
        tracker.record(&key(), RunSample::new(100, 2, "a"));
        let window = tracker.record(&key(), RunSample::new(120, 2, "b"));
        assert_eq!(window.len(), 2);
        assert_eq!(window[1].word_count, 120);
    }

    #[test]
    fn test_keys_are_independent_and_resettable() {
        let tracker = ConsistencyTracker::new(10);
        let other = TrackerKey::new("informed_consent", "long_form_v1");
        tracker.record(&key(), RunSample::new(100, 2, "a"));
        tracker.record(&other, RunSample::new(300, 4, "b"));

        tracker.reset(&key());
        assert!(tracker.get_window(&key()).is_empty());
        assert_eq!(tracker.get_window(&other).len(), 1);

        tracker.reset_all();
        assert!(tracker.keys().is_empty());
    }

    #[test]
    fn test_summary() {
        let tracker = ConsistencyTracker::new(10);
        tracker.record(&key(), RunSample::new(100, 2, "a"));
        tracker.record(&key(), RunSample::new(100, 2, "a"));
        tracker.record(&key(), RunSample::new(100, 2, "b"));
        let summary = tracker.summary(&key(), 15.0);
        assert_eq!(summary.runs_analyzed, 3);
        assert_eq!(summary.coefficient_of_variation, 0.0);
        assert_eq!(summary.unique_structures, 2);
        assert!((summary.structural_consistency - (1.0 - 1.0 / 3.0)).abs() < 1e-9);
        assert!(summary.target_achieved);
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let tracker = Arc::new(ConsistencyTracker::new(1000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        tracker.record(&key(), RunSample::new(t * 100 + i, 1, "h"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.get_window(&key()).len(), 400);
    }

    #[test]
    fn test_fingerprint_tracks_shape() {
        let a = structural_fingerprint(&[40, 60, 20]);
        assert_eq!(a.len(), 16);
        assert_eq!(a, structural_fingerprint(&[40, 60, 20]));
        assert_ne!(a, structural_fingerprint(&[60, 40, 20]));
    }

    proptest! {
        #[test]
        fn cv_is_scale_invariant(
            values in prop::collection::vec(1.0f64..1000.0, 2..20),
            scale in 0.5f64..10.0,
        ) {
            let scaled: Vec<f64> = values.iter().map(|v| v * scale).collect();
            let a = coefficient_of_variation(&values);
            let b = coefficient_of_variation(&scaled);
            prop_assert!((a - b).abs() < 1e-6 * a.max(1.0));
        }

        #[test]
        fn cv_is_never_negative(values in prop::collection::vec(0.0f64..1000.0, 0..20)) {
            prop_assert!(coefficient_of_variation(&values) >= 0.0);
        }
    }
}
