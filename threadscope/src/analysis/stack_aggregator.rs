//! Per-thread stack histograms built from decoded samples.
//!
//! # Architecture
//!
//! - **`ThreadHistogram`** - StackKey → accumulated metric for one thread label,
//!   in first-insertion order
//! - **`StackAggregator`** - Routes samples to histograms and answers
//!   sub-sequence queries and stack assertions
//!
//! ## Data Flow
//!
//! ```text
//! Sample ("Worker-1 (140300)", 2, [run:5, step:9])
//!     │
//!     ├──► thread_label()        "Worker-1"
//!     │
//!     └──► ThreadHistogram
//!             ├── Exact     (run:5, step:9)  += 2
//!             └── Collapsed (run, step)      += 2
//! ```
//!
//! # Performance
//!
//! - `ingest()`: O(depth) (two key builds, two hash updates)
//! - `query()`: O(keys × depth) for the thread
//! - `thread_count()`, `sample_count()`, `total_metric()`: O(1)
//!
//! Accumulated values saturate at the bounds of `i64`.

// Percentage calculations intentionally convert i64 to f64
#![allow(clippy::cast_precision_loss)]

use std::collections::HashMap;
use threadscope_common::LABEL_DECORATION_OPEN;

use crate::domain::{StackAssertionError, StackKey};
use crate::recording::{Metadata, Recording, Sample};

// =============================================================================
// THREAD LABELS
// =============================================================================

/// Grouping label of a raw thread name: the name without its last
/// ` (...)` decoration.
///
/// `"Worker-1 (daemon)"` groups under `"Worker-1"`; an undecorated name is
/// its own label.
#[must_use]
pub fn thread_label(raw: &str) -> &str {
    match raw.rfind(LABEL_DECORATION_OPEN) {
        Some(end) => &raw[..end],
        None => raw,
    }
}

// =============================================================================
// THREAD HISTOGRAM
// =============================================================================

/// Accumulated metric per stack for one thread label.
#[derive(Debug, Clone, Default)]
pub struct ThreadHistogram {
    entries: Vec<(StackKey, i64)>,
    index: HashMap<StackKey, usize>,
    total: i64,
}

impl ThreadHistogram {
    fn add(&mut self, key: StackKey, value: i64) {
        match self.index.get(&key) {
            Some(&slot) => {
                let accumulated = &mut self.entries[slot].1;
                *accumulated = accumulated.saturating_add(value);
            }
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    /// Accumulated value of exactly `key`.
    #[must_use]
    pub fn get(&self, key: &StackKey) -> Option<i64> {
        self.index.get(key).map(|&slot| self.entries[slot].1)
    }

    /// Value of the first stored key of the same kind that contains
    /// `pattern` as a contiguous run.
    #[must_use]
    pub fn find(&self, pattern: &StackKey) -> Option<i64> {
        self.entries
            .iter()
            .find(|(key, _)| key.contains_run(pattern))
            .map(|(_, value)| *value)
    }

    /// All keys in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&StackKey, i64)> {
        self.entries.iter().map(|(key, value)| (key, *value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &StackKey> {
        self.entries.iter().map(|(key, _)| key)
    }

    /// Sum of the metric of every sample ingested for this thread.
    #[must_use]
    pub fn total(&self) -> i64 {
        self.total
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One row of a thread's top-stacks report.
#[derive(Debug, Clone, PartialEq)]
pub struct StackShare {
    pub stack: StackKey,
    pub value: i64,
    /// Share of the thread's total metric (0.0 - 100.0).
    pub percentage: f64,
}

// =============================================================================
// STACK AGGREGATOR
// =============================================================================

#[derive(Debug, Default)]
pub struct StackAggregator {
    histograms: Vec<(String, ThreadHistogram)>,
    by_label: HashMap<String, usize>,
    /// Raw thread id → name recorded in the metadata header.
    thread_names: HashMap<String, String>,
    sample_count: usize,
    total_metric: i64,
}

impl StackAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregator that resolves bare thread ids through the recording's
    /// `thread:<id>` metadata entries.
    #[must_use]
    pub fn with_metadata(metadata: &Metadata) -> Self {
        Self {
            thread_names: metadata.thread_names(),
            ..Self::default()
        }
    }

    /// Aggregate a fully decoded recording.
    #[must_use]
    pub fn from_recording(recording: &Recording) -> Self {
        let mut aggregator = Self::with_metadata(&recording.metadata);
        aggregator.ingest_all(&recording.samples);
        aggregator
    }

    fn resolve_label(&self, raw: &str) -> String {
        let label = thread_label(raw);
        match self.thread_names.get(label) {
            Some(name) if label.bytes().all(|b| b.is_ascii_digit()) => name.clone(),
            _ => label.to_string(),
        }
    }

    /// Add one sample to its thread's exact and collapsed stacks.
    pub fn ingest(&mut self, sample: &Sample) {
        let label = self.resolve_label(&sample.thread_label);
        let slot = match self.by_label.get(&label) {
            Some(&slot) => slot,
            None => {
                self.by_label.insert(label.clone(), self.histograms.len());
                self.histograms.push((label, ThreadHistogram::default()));
                self.histograms.len() - 1
            }
        };

        let value = sample.metric.value;
        let histogram = &mut self.histograms[slot].1;
        histogram.add(StackKey::exact(&sample.frames), value);
        histogram.add(StackKey::collapsed(&sample.frames), value);
        histogram.total = histogram.total.saturating_add(value);

        self.sample_count += 1;
        self.total_metric = self.total_metric.saturating_add(value);
    }

    pub fn ingest_all<'a>(&mut self, samples: impl IntoIterator<Item = &'a Sample>) {
        for sample in samples {
            self.ingest(sample);
        }
    }

    /// Value of the first stack (insertion order) of `thread` containing
    /// `pattern` as a contiguous run, matching only keys of the pattern's
    /// kind. `None` if the thread is unknown or nothing matches.
    #[must_use]
    pub fn query(&self, thread: &str, pattern: &StackKey) -> Option<i64> {
        self.histogram(thread)?.find(pattern)
    }

    /// Check that `thread` recorded exactly `stack` and that its value
    /// satisfies `predicate`.
    ///
    /// # Errors
    /// Returns the [`StackAssertionError`] variant naming which expectation
    /// failed, with the recorded threads or stacks for comparison.
    pub fn assert_stack(
        &self,
        thread: &str,
        stack: &StackKey,
        predicate: impl Fn(i64) -> bool,
    ) -> Result<i64, StackAssertionError> {
        let histogram = self
            .histogram(thread)
            .ok_or_else(|| StackAssertionError::UnknownThread {
                thread: thread.to_string(),
                known: self.threads().map(str::to_string).collect(),
            })?;

        let value = histogram
            .get(stack)
            .ok_or_else(|| StackAssertionError::UnknownStack {
                thread: thread.to_string(),
                stack: stack.clone(),
                known: histogram.keys().cloned().collect(),
            })?;

        if predicate(value) {
            Ok(value)
        } else {
            Err(StackAssertionError::PredicateFailed {
                thread: thread.to_string(),
                stack: stack.clone(),
                value,
            })
        }
    }

    #[must_use]
    pub fn histogram(&self, thread: &str) -> Option<&ThreadHistogram> {
        self.by_label.get(thread).map(|&slot| &self.histograms[slot].1)
    }

    /// Thread labels in first-seen order.
    pub fn threads(&self) -> impl Iterator<Item = &str> {
        self.histograms.iter().map(|(label, _)| label.as_str())
    }

    /// The `n` exact stacks of `thread` with the largest values; ties keep
    /// insertion order.
    #[must_use]
    pub fn top_stacks(&self, thread: &str, n: usize) -> Vec<StackShare> {
        let Some(histogram) = self.histogram(thread) else {
            return Vec::new();
        };

        let mut exact: Vec<(&StackKey, i64)> = histogram
            .iter()
            .filter(|(key, _)| key.is_exact())
            .collect();
        exact.sort_by(|a, b| b.1.cmp(&a.1));

        let total = histogram.total();
        exact
            .into_iter()
            .take(n)
            .map(|(stack, value)| StackShare {
                stack: stack.clone(),
                value,
                percentage: if total == 0 {
                    0.0
                } else {
                    (value as f64 / total as f64) * 100.0
                },
            })
            .collect()
    }

    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.histograms.len()
    }

    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    #[must_use]
    pub fn total_metric(&self) -> i64 {
        self.total_metric
    }
}

// =============================================================================
// TESTS
// =============================================================================
