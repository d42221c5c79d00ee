//! Process-scoped profiling context
//!
//! Bundles the thread registry and the task graph that the hook layer keeps
//! current and the sampler reads. One context exists per profiling session
//! and is handed around explicitly as `Arc<ProfilerContext>`.

use log::info;

use super::{TaskGraph, ThreadRegistry};
use crate::domain::ThreadId;

#[derive(Debug, Default)]
pub struct ProfilerContext {
    threads: ThreadRegistry,
    tasks: TaskGraph,
}

impl ProfilerContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn threads(&self) -> &ThreadRegistry {
        &self.threads
    }

    #[must_use]
    pub fn tasks(&self) -> &TaskGraph {
        &self.tasks
    }

    /// Reset state inherited across `fork()`.
    ///
    /// Only the forking thread exists in the child, so every other identity
    /// is dropped. Task and loop state belongs to threads that no longer
    /// exist and is cleared wholesale.
    pub fn reset_after_fork(&self, forking_thread: ThreadId) {
        let inherited = self.threads.len();
        self.threads.retain_only(forking_thread);
        self.tasks.clear();
        info!(
            "Reset profiling context after fork: kept {forking_thread}, dropped {} thread(s)",
            inherited.saturating_sub(self.threads.len())
        );
    }

    /// Drop all identities, tasks and loop bindings.
    pub fn reset(&self) {
        self.threads.clear();
        self.tasks.clear();
    }
}
