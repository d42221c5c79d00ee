//! Live identity and task tracking
//!
//! The structures in this module are written from the host runtime's
//! lifecycle hooks and read concurrently by the sampler:
//! - `thread_registry`: thread id → name, with deferred removal and generations
//! - `task_graph`: task parent edges and thread → event loop bindings
//! - `context`: the per-session bundle of both

pub mod context;
pub mod task_graph;
pub mod thread_registry;

pub use context::ProfilerContext;
pub use task_graph::{LoopNotice, TaskGraph, TaskNode};
pub use thread_registry::{ThreadRegistry, ThreadSnapshot};
