//! # Shared Recording Vocabulary (Engine ↔ Analysis)
//!
//! Defines the constants and tags shared between the sampling engine that
//! writes a recording and the analysis side that decodes it. Everything here
//! is `no_std` so an engine living in a constrained context (signal handler,
//! cooperative sampler) can depend on it without pulling in allocation.
//!
//! ## Collapsed Record Layout
//!
//! ```text
//! # mode: wall                                  ← metadata header
//! # interval: 1000
//! # thread:140211: MainThread
//! P4242;TMainThread (140211);app.py:main:10;app.py:run:5 1000
//!  │     │                    └── frames, outermost first ──┘  └ metric value
//!  │     └── thread label (decorated with its raw id)
//!  └── optional process segment
//! ```
//!
//! ## Key Types
//!
//! - [`MetricKind`] - What a sample's metric value measures

#![cfg_attr(not(test), no_std)]

// ============================================================================
// Metadata Header
// ============================================================================

/// Leading character of a metadata line.
pub const METADATA_PREFIX: char = '#';

/// Separator between a metadata key and its value.
pub const METADATA_SEPARATOR: &str = ": ";

/// Metadata key naming the metric recorded by every sample in the stream.
///
/// Values are the tags accepted by [`MetricKind::from_tag`].
pub const MODE_KEY: &str = "mode";

/// Metadata key carrying the sampling interval in microseconds.
pub const INTERVAL_KEY: &str = "interval";

/// Prefix of metadata keys that map a raw thread id to its name at record time.
///
/// `# thread:140211: MainThread` resolves the bare label `140211`.
pub const THREAD_NAME_KEY_PREFIX: &str = "thread:";

// ============================================================================
// Sample Records
// ============================================================================

/// Separates the segments (process, thread, frames) of one sample line.
pub const SEGMENT_SEPARATOR: char = ';';

/// Separates the file, function and line of one frame.
pub const FRAME_FIELD_SEPARATOR: char = ':';

/// Separates the stack from the trailing metric value.
pub const VALUE_SEPARATOR: char = ' ';

/// Leading character of the optional process segment.
pub const PROCESS_SEGMENT_PREFIX: char = 'P';

/// Leading character of the mandatory thread segment.
pub const THREAD_SEGMENT_PREFIX: char = 'T';

/// Opening of the decoration engines append to thread labels, e.g. `" (140211)"`.
pub const LABEL_DECORATION_OPEN: &str = " (";

// ============================================================================
// Defaults
// ============================================================================

/// Default sampling interval (microseconds).
pub const DEFAULT_INTERVAL_US: u64 = 1000;

/// Name given to the dedicated sampler thread.
pub const SAMPLER_THREAD_NAME: &str = "threadscope.sampler";

/// Sentinel name returned for identifiers with no known name.
pub const UNKNOWN_THREAD_NAME: &str = "<unknown>";

// ============================================================================
// Metric Kinds
// ============================================================================

/// What a sample's metric value measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum MetricKind {
    /// On-CPU time in microseconds
    Cpu = 0,
    /// Wall-clock time in microseconds
    #[default]
    Wall = 1,
    /// Allocated bytes (may be negative for releases)
    Memory = 2,
}

impl MetricKind {
    /// Parse a wire tag (`cpu`, `wall`, `memory`).
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "cpu" => Some(Self::Cpu),
            "wall" => Some(Self::Wall),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }

    /// The wire tag for this kind.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Wall => "wall",
            Self::Memory => "memory",
        }
    }
}
