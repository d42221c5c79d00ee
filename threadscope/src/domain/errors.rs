//! Structured error types for threadscope
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Each enum maps to one failure policy: control errors propagate, hook
//! errors are logged and swallowed, decode errors fail fast with a location,
//! assertion errors carry enough context to pinpoint the mismatch.

use super::types::StackKey;
use thiserror::Error;

/// Failure reported by a sampling engine implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Failed to initialise sampling engine: {0}")]
    InitFailed(#[source] EngineError),

    #[error("Failed to start sampling engine: {0}")]
    StartFailed(#[source] EngineError),

    #[error("Failed to stop sampling engine: {0}")]
    StopFailed(#[source] EngineError),

    #[error("Sampler configuration is fixed once sampling has started")]
    ConfigLocked,

    #[error("Invalid sampler configuration: {0}")]
    InvalidConfig(String),

    #[error("Sampling is already running")]
    AlreadyRunning,

    #[error("Stealth sampling requires a running tokio runtime")]
    NoAsyncRuntime,

    #[error("Failed to spawn sampler thread: {0}")]
    SpawnFailed(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum HookError {
    #[error("Tracking {event} failed: {reason}")]
    TrackingFailed { event: String, reason: String },

    #[error("Hook for {event} panicked: {message}")]
    Panicked { event: String, message: String },

    #[error("Sampler could not be restarted after fork: {0}")]
    RestartFailed(#[from] ControlError),
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Malformed record at line {line} (byte offset {offset}): {reason}")]
    Malformed {
        line: usize,
        offset: u64,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    /// Line number (1-based) of the offending record, if known.
    #[must_use]
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Malformed { line, .. } => Some(*line),
            Self::Io(_) => None,
        }
    }
}

/// Mismatch reported by `StackAggregator::assert_stack`.
///
/// The variant tells which expectation failed; the payload lists what was
/// actually recorded so a failing test shows the closest data at hand.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StackAssertionError {
    #[error("Expected thread {thread}, found {known:?}")]
    UnknownThread { thread: String, known: Vec<String> },

    #[error("Expected stack {stack} in thread {thread}, found [{}]", join_stacks(.known))]
    UnknownStack {
        thread: String,
        stack: StackKey,
        known: Vec<StackKey>,
    },

    #[error("Stack {stack} in thread {thread} has value {value}, which fails the predicate")]
    PredicateFailed {
        thread: String,
        stack: StackKey,
        value: i64,
    },
}

fn join_stacks(stacks: &[StackKey]) -> String {
    stacks
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
