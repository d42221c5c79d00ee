//! # threadscope - Identity Correlation and Stack Aggregation for a Sampling Profiler
//!
//! A sampling engine captures raw call stacks per OS thread from an
//! asynchronous context where names and task relationships cannot be looked
//! up safely. threadscope keeps those maps current from the host runtime's
//! lifecycle events, and later replays the engine's recordings into
//! per-thread stack histograms that can be queried and asserted on.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Host runtime (threads, tasks)                 │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ RuntimeEvent
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  runtime::Session  (hook layer, engine start/stop, fork, exit)   │
//! │         │                                   │                    │
//! │         ▼                                   ▼                    │
//! │  ┌──────────────────┐              ┌──────────────────┐         │
//! │  │ ThreadRegistry   │◄── reads ────│ SamplingEngine   │         │
//! │  │ TaskGraph        │              │ (thread / tokio) │         │
//! │  └──────────────────┘              └────────┬─────────┘         │
//! └─────────────────────────────────────────────┼───────────────────┘
//!                                               │ recording
//!                                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  recording::SampleDecoder ──► analysis::StackAggregator          │
//! │  (collapsed text / JSON lines)   (query, assert_stack, top)      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! ### Live Tracking
//!
//! - [`tracking`]: thread id → name registry with deferred removal, task
//!   parent graph and event-loop bindings, bundled per session in
//!   [`tracking::ProfilerContext`]
//! - [`runtime`]: lifecycle events, the [`runtime::Session`] that applies
//!   them, the [`runtime::SamplingEngine`] control trait and a reference
//!   interval engine
//! - [`config`]: sampler configuration
//!
//! ### Offline Analysis
//!
//! - [`recording`]: streaming decoder for both wire shapes
//! - [`analysis`]: per-thread exact and collapsed stack histograms
//!
//! ### Shared
//!
//! - [`domain`]: identifiers, frames, stack keys and error types
//! - [`cli`]: argument parsing for the report binary
//!
//! ## Concurrency
//!
//! Live tracking is called from every thread of the profiled program and
//! read by the sampler concurrently; it uses sharded maps and atomics and
//! never holds a lock across engine calls. Offline analysis is
//! single-threaded and processes records strictly in order.

// Expose modules for testing
pub mod analysis;
pub mod cli;
pub mod config;
pub mod domain;
pub mod recording;
pub mod runtime;
pub mod tracking;
