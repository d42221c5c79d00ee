//! Domain model for threadscope
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via newtype pattern
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{Frame, LoopId, Metric, MetricKind, StackKey, TaskId, ThreadId};

pub use errors::{ControlError, DecodeError, EngineError, HookError, StackAssertionError};
