//! Lifecycle events the host runtime reports to the hook layer
//!
//! The host subscribes the hook layer to its thread, task and process
//! lifecycle and forwards one [`RuntimeEvent`] per occurrence. Events carry
//! raw identifiers only; names are resolved later from the registries.

use std::fmt;

use crate::domain::{LoopId, TaskId, ThreadId};

/// Which side of a `fork()` reported the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkRole {
    Parent,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// A thread received its identifier and is about to run.
    ThreadCreated { thread_id: ThreadId, name: String },
    /// A live thread changed its name.
    ThreadRenamed { thread_id: ThreadId, name: String },
    /// A thread finished its body and is about to exit.
    ThreadExiting { thread_id: ThreadId },
    /// A task was scheduled by a thread's event loop.
    TaskCreated {
        task_id: TaskId,
        thread_id: ThreadId,
    },
    /// A task was given a human-readable name.
    TaskNamed { task_id: TaskId, name: String },
    /// A thread started driving an event loop.
    LoopBound {
        thread_id: ThreadId,
        loop_id: LoopId,
    },
    /// `parent` is waiting on every task in `children`.
    TasksGathered {
        parent: TaskId,
        children: Vec<TaskId>,
    },
    /// The process forked; `thread_id` is the thread that called `fork()`.
    Forked { role: ForkRole, thread_id: ThreadId },
}

impl RuntimeEvent {
    /// Short event name for log lines and hook errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ThreadCreated { .. } => "thread-created",
            Self::ThreadRenamed { .. } => "thread-renamed",
            Self::ThreadExiting { .. } => "thread-exiting",
            Self::TaskCreated { .. } => "task-created",
            Self::TaskNamed { .. } => "task-named",
            Self::LoopBound { .. } => "loop-bound",
            Self::TasksGathered { .. } => "tasks-gathered",
            Self::Forked { .. } => "process-forked",
        }
    }
}

impl fmt::Display for RuntimeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThreadCreated { thread_id, name } | Self::ThreadRenamed { thread_id, name } => {
                write!(f, "{} {thread_id} {name:?}", self.kind())
            }
            Self::ThreadExiting { thread_id } => write!(f, "{} {thread_id}", self.kind()),
            Self::TaskCreated { task_id, thread_id } => {
                write!(f, "{} {task_id} on {thread_id}", self.kind())
            }
            Self::TaskNamed { task_id, name } => write!(f, "{} {task_id} {name:?}", self.kind()),
            Self::LoopBound { thread_id, loop_id } => {
                write!(f, "{} {thread_id} -> {loop_id}", self.kind())
            }
            Self::TasksGathered { parent, children } => {
                write!(f, "{} {parent} <- {} task(s)", self.kind(), children.len())
            }
            Self::Forked { role, thread_id } => {
                write!(f, "{} ({role:?}) by {thread_id}", self.kind())
            }
        }
    }
}
