//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent passing a task handle where a thread
//! handle is expected, and make registry signatures self-describing.

use serde::{Deserialize, Serialize};
use std::fmt;

pub use threadscope_common::MetricKind;

/// Runtime thread identifier
///
/// Opaque handle the host runtime uses for an OS thread (on POSIX hosts this
/// is the `pthread_t` value). The OS may hand the same value to a new thread
/// once the previous owner has exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub u64);

impl ThreadId {
    /// Identifier of the calling thread.
    #[must_use]
    #[allow(unsafe_code, clippy::unnecessary_cast)]
    pub fn current() -> Self {
        // SAFETY: pthread_self has no preconditions and cannot fail
        let handle = unsafe { libc::pthread_self() };
        Self(handle as u64)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TID:{}", self.0)
    }
}

/// Cooperative task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task#{}", self.0)
    }
}

/// Event loop identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoopId(pub u64);

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Loop#{}", self.0)
    }
}

/// One resolved call frame of a recorded sample.
///
/// Stack keys are built from `function` and `line` only; `file` is kept
/// for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Frame {
    pub function: String,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Frame {
    pub fn new(function: impl Into<String>, line: u32) -> Self {
        Self {
            function: function.into(),
            line,
            file: None,
        }
    }

    #[must_use]
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.function, self.line)
    }
}

/// Identity of one call-stack shape in a thread histogram.
///
/// Every ingested sample contributes to both keyings: the exact key keeps
/// line precision, the collapsed key only keeps function names. Frames are
/// ordered outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StackKey {
    Exact(Vec<(String, u32)>),
    Collapsed(Vec<String>),
}

impl StackKey {
    /// Exact key of a frame sequence.
    #[must_use]
    pub fn exact(frames: &[Frame]) -> Self {
        Self::Exact(frames.iter().map(|f| (f.function.clone(), f.line)).collect())
    }

    /// Collapsed key of a frame sequence.
    #[must_use]
    pub fn collapsed(frames: &[Frame]) -> Self {
        Self::Collapsed(frames.iter().map(|f| f.function.clone()).collect())
    }

    /// Build an exact key from `(function, line)` pairs.
    pub fn exact_from<S: Into<String>>(pairs: impl IntoIterator<Item = (S, u32)>) -> Self {
        Self::Exact(
            pairs
                .into_iter()
                .map(|(function, line)| (function.into(), line))
                .collect(),
        )
    }

    /// Build a collapsed key from function names.
    pub fn collapsed_from<S: Into<String>>(functions: impl IntoIterator<Item = S>) -> Self {
        Self::Collapsed(functions.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Exact(frames) => frames.len(),
            Self::Collapsed(functions) => functions.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }

    /// Returns true if `pattern` occurs in this key as a contiguous run.
    ///
    /// Keys of different kinds never match each other. The empty pattern
    /// matches every key of its kind.
    #[must_use]
    pub fn contains_run(&self, pattern: &StackKey) -> bool {
        match (self, pattern) {
            (Self::Exact(stack), Self::Exact(run)) => contains_run(stack, run),
            (Self::Collapsed(stack), Self::Collapsed(run)) => contains_run(stack, run),
            _ => false,
        }
    }
}

fn contains_run<T: PartialEq>(stack: &[T], run: &[T]) -> bool {
    run.is_empty() || stack.windows(run.len()).any(|window| window == run)
}

impl fmt::Display for StackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = match self {
            Self::Exact(frames) => frames
                .iter()
                .map(|(function, line)| format!("{function}:{line}"))
                .collect(),
            Self::Collapsed(functions) => functions.clone(),
        };
        write!(f, "({})", parts.join(", "))
    }
}

/// A sample's metric: what was measured and how much.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    #[serde(with = "metric_kind_tag")]
    pub kind: MetricKind,
    pub value: i64,
}

/// Serde adapter keeping `MetricKind` on the wire as its tag.
mod metric_kind_tag {
    use super::MetricKind;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(kind: &MetricKind, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(kind.tag())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<MetricKind, D::Error> {
        let tag = String::deserialize(deserializer)?;
        MetricKind::from_tag(&tag)
            .ok_or_else(|| D::Error::custom(format!("unknown metric kind {tag:?}")))
    }
}
