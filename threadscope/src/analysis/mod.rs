//! Offline analysis of recorded samples
//!
//! Pure aggregation logic, single-threaded and deterministic, separated
//! from recording decoding and from the report binary.

pub mod stack_aggregator;

pub use stack_aggregator::{thread_label, StackAggregator, StackShare, ThreadHistogram};
