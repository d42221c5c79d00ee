//! Runtime hook layer
//!
//! Connects the host runtime's lifecycle (threads, tasks, event loops,
//! `fork`, process exit) to the tracking structures and drives the sampling
//! engine's start/stop lifecycle.

pub mod engine;
pub mod events;
pub mod process_hooks;
pub mod session;

pub use engine::{EngineSettings, IntervalSampler, SamplingEngine, StopSignal};
pub use events::{ForkRole, RuntimeEvent};
pub use process_hooks::install_fork_hook;
pub use session::Session;
