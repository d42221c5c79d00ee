//! Recorded samples and their metadata header
//!
//! A recording is the engine's output: one metadata header followed by a
//! stream of samples. [`SampleDecoder`] turns either wire shape into
//! [`Sample`] values lazily; [`Recording`] loads a whole file at once.

pub mod collapsed;
pub mod decoder;
pub mod json_lines;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use threadscope_common::{
    INTERVAL_KEY, METADATA_PREFIX, METADATA_SEPARATOR, MODE_KEY, THREAD_NAME_KEY_PREFIX,
};

use crate::domain::{DecodeError, Frame, Metric, MetricKind};
use crate::tracking::ThreadRegistry;

pub use decoder::{SampleDecoder, WireFormat};

/// One decoded sample: which thread, what was measured, and the call stack
/// (outermost frame first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(rename = "thread")]
    pub thread_label: String,
    pub metric: Metric,
    pub frames: Vec<Frame>,
    #[serde(rename = "pid", default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
}

impl Sample {
    pub fn new(thread_label: impl Into<String>, metric: Metric, frames: Vec<Frame>) -> Self {
        Self {
            thread_label: thread_label.into(),
            metric,
            frames,
            process_id: None,
        }
    }
}

/// Key/value header of a recording, in the order the keys first appeared.
///
/// Setting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, String)>,
}

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the registry's names as `thread:<id>` entries, so that
    /// bare thread ids in the samples can be resolved offline.
    #[must_use]
    pub fn from_registry(registry: &ThreadRegistry) -> Self {
        let mut metadata = Self::new();
        for thread in registry.snapshot() {
            metadata.insert(
                format!("{THREAD_NAME_KEY_PREFIX}{}", thread.thread_id.0),
                &*thread.name,
            );
        }
        metadata
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Merge `other` into `self`; keys from `other` win.
    pub fn merge(&mut self, other: Metadata) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Metric recorded by the samples; `wall` when the header is silent.
    ///
    /// Returns `None` for an unrecognised `mode` value.
    #[must_use]
    pub fn metric_kind(&self) -> Option<MetricKind> {
        match self.get(MODE_KEY) {
            Some(tag) => MetricKind::from_tag(tag),
            None => Some(MetricKind::default()),
        }
    }

    #[must_use]
    pub fn interval_us(&self) -> Option<u64> {
        self.get(INTERVAL_KEY).and_then(|v| v.parse().ok())
    }

    /// Raw thread id (as written in sample labels) → recorded name.
    #[must_use]
    pub fn thread_names(&self) -> HashMap<String, String> {
        self.iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(THREAD_NAME_KEY_PREFIX)
                    .map(|id| (id.to_string(), value.to_string()))
            })
            .collect()
    }
}

impl fmt::Display for Metadata {
    /// Renders the collapsed-text header, one `# key: value` line per entry.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            writeln!(f, "{METADATA_PREFIX} {key}{METADATA_SEPARATOR}{value}")?;
        }
        Ok(())
    }
}

/// A fully decoded recording.
#[derive(Debug, Clone, Default)]
pub struct Recording {
    pub metadata: Metadata,
    pub samples: Vec<Sample>,
}

impl Recording {
    /// Decode every sample from `reader`.
    ///
    /// # Errors
    /// Fails on the first malformed record.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, DecodeError> {
        let mut decoder = SampleDecoder::new(reader)?;
        let samples = decoder.by_ref().collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            metadata: decoder.into_metadata(),
            samples,
        })
    }

    /// Load a recording file in either wire format.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open recording {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to decode recording {}", path.display()))
    }

    /// Sum of every sample's metric, saturating at the bounds of `i64`.
    #[must_use]
    pub fn total_metric(&self) -> i64 {
        self.samples
            .iter()
            .fold(0_i64, |total, s| total.saturating_add(s.metric.value))
    }
}
