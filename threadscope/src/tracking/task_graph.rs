//! # Task Graph
//!
//! Parent/child relationships between cooperative tasks, and the event loop
//! each thread is currently driving.
//!
//! ```text
//!   Task#1 (gathering task, owner TID:7)
//!     ├── Task#2   parent = Task#1
//!     └── Task#3   parent = Task#1
//!
//!   TID:7 ──bound to──► Loop#40
//! ```
//!
//! Nodes are created on first mention (registration or link) and live for
//! the whole session: samples recorded after a task completed may still be
//! attributed through its parent chain. Only [`TaskGraph::clear`] removes them.
//!
//! ## Re-gathering
//!
//! A task has at most one parent. Gathering an already-linked task under a
//! different parent replaces the edge (last writer wins); the replacement is
//! logged at debug level so surprising attributions can be traced back.
//!
//! ## Loop Refresh Notices
//!
//! Binding a loop bumps [`TaskGraph::loop_epoch`] and offers a [`LoopNotice`]
//! on a bounded channel. The send never blocks; if the sampler is not keeping
//! up the notice is dropped and the epoch change is the fallback signal.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use dashmap::DashMap;
use log::{debug, warn};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::domain::{LoopId, TaskId, ThreadId};

/// Capacity of the loop refresh channel.
const LOOP_NOTICE_CAPACITY: usize = 256;

/// One task and what is known about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskNode {
    pub task_id: TaskId,
    pub owner_thread: Option<ThreadId>,
    pub parent: Option<TaskId>,
    pub name: Option<Arc<str>>,
}

impl TaskNode {
    fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            owner_thread: None,
            parent: None,
            name: None,
        }
    }
}

/// Side-channel notification telling the sampler to refresh its loop view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopNotice {
    pub thread_id: ThreadId,
    pub loop_id: LoopId,
    pub previous: Option<LoopId>,
}

#[derive(Debug)]
pub struct TaskGraph {
    tasks: DashMap<TaskId, TaskNode>,
    loops: DashMap<ThreadId, LoopId>,
    loop_epoch: AtomicU64,
    notice_tx: Sender<LoopNotice>,
    notice_rx: Receiver<LoopNotice>,
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGraph {
    #[must_use]
    pub fn new() -> Self {
        let (notice_tx, notice_rx) = bounded(LOOP_NOTICE_CAPACITY);
        Self {
            tasks: DashMap::new(),
            loops: DashMap::new(),
            loop_epoch: AtomicU64::new(0),
            notice_tx,
            notice_rx,
        }
    }

    // =========================================================================
    // Event loops
    // =========================================================================

    /// Record (or replace) the event loop driven by `thread_id`.
    ///
    /// Returns the previous binding, if any.
    pub fn bind_loop(&self, thread_id: ThreadId, loop_id: LoopId) -> Option<LoopId> {
        let previous = self.loops.insert(thread_id, loop_id);
        if previous == Some(loop_id) {
            return previous;
        }

        self.loop_epoch.fetch_add(1, Ordering::AcqRel);
        debug!("{thread_id} bound to {loop_id} (was {previous:?})");

        let notice = LoopNotice {
            thread_id,
            loop_id,
            previous,
        };
        match self.notice_tx.try_send(notice) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => debug!("Loop notice queue full, relying on epoch"),
        }
        previous
    }

    #[must_use]
    pub fn lookup_loop(&self, thread_id: ThreadId) -> Option<LoopId> {
        self.loops.get(&thread_id).map(|entry| *entry)
    }

    /// Number of effective loop binding changes so far.
    #[must_use]
    pub fn loop_epoch(&self) -> u64 {
        self.loop_epoch.load(Ordering::Acquire)
    }

    /// Receiver for loop refresh notices. All clones share one queue.
    #[must_use]
    pub fn loop_notices(&self) -> Receiver<LoopNotice> {
        self.notice_rx.clone()
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    /// Record that `task_id` was scheduled by `owner_thread`.
    pub fn register_task(&self, task_id: TaskId, owner_thread: ThreadId) {
        self.tasks.entry(task_id).or_insert_with(|| TaskNode::new(task_id)).owner_thread =
            Some(owner_thread);
    }

    pub fn name_task(&self, task_id: TaskId, name: &str) {
        self.tasks.entry(task_id).or_insert_with(|| TaskNode::new(task_id)).name =
            Some(Arc::from(name));
    }

    /// Record `parent` as the gathering task of `child`.
    ///
    /// Returns true if the graph changed. Repeating an identical link is a
    /// no-op; linking to a different parent replaces the previous edge.
    pub fn link(&self, parent: TaskId, child: TaskId) -> bool {
        if parent == child {
            warn!("Ignoring self-link of {child}");
            return false;
        }

        // Parent first: never hold a child entry while touching another shard.
        self.tasks.entry(parent).or_insert_with(|| TaskNode::new(parent));

        let mut node = self.tasks.entry(child).or_insert_with(|| TaskNode::new(child));
        match node.parent {
            Some(existing) if existing == parent => false,
            Some(existing) => {
                debug!("{child} re-gathered: parent {existing} replaced by {parent}");
                node.parent = Some(parent);
                true
            }
            None => {
                node.parent = Some(parent);
                true
            }
        }
    }

    /// Link every task of a gather group to the gathering task.
    ///
    /// Returns how many edges changed.
    pub fn link_all(&self, parent: TaskId, children: impl IntoIterator<Item = TaskId>) -> usize {
        children.into_iter().filter(|child| self.link(parent, *child)).count()
    }

    #[must_use]
    pub fn lookup_parent(&self, task_id: TaskId) -> Option<TaskId> {
        self.tasks.get(&task_id).and_then(|node| node.parent)
    }

    #[must_use]
    pub fn task(&self, task_id: TaskId) -> Option<TaskNode> {
        self.tasks.get(&task_id).map(|node| node.clone())
    }

    /// The chain `[task, parent, grandparent, ...]` up to the root.
    ///
    /// Re-gathering can produce cycles; the walk stops at the first task
    /// already visited. Unknown tasks yield a single-element chain.
    #[must_use]
    pub fn ancestry(&self, task_id: TaskId) -> Vec<TaskId> {
        let mut chain = vec![task_id];
        let mut seen = HashSet::from([task_id]);
        let mut current = task_id;

        while let Some(parent) = self.lookup_parent(current) {
            if !seen.insert(parent) {
                debug!("Cycle in ancestry of {task_id} at {parent}");
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Drop every task and loop binding.
    pub fn clear(&self) {
        self.tasks.clear();
        self.loops.clear();
        while self.notice_rx.try_recv().is_ok() {}
        self.loop_epoch.fetch_add(1, Ordering::AcqRel);
    }

    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_and_lookup_parent() {
        let graph = TaskGraph::new();
        assert!(graph.link(TaskId(1), TaskId(2)));

        assert_eq!(graph.lookup_parent(TaskId(2)), Some(TaskId(1)));
        assert_eq!(graph.lookup_parent(TaskId(1)), None);
        assert_eq!(graph.lookup_parent(TaskId(99)), None);
    }

    #[test]
    fn test_link_is_idempotent() {
        let graph = TaskGraph::new();
        assert!(graph.link(TaskId(1), TaskId(2)));
        assert!(!graph.link(TaskId(1), TaskId(2)));

        assert_eq!(graph.task_count(), 2);
        assert_eq!(graph.lookup_parent(TaskId(2)), Some(TaskId(1)));
    }

    #[test]
    fn test_relink_last_writer_wins() {
        let graph = TaskGraph::new();
        graph.link(TaskId(1), TaskId(3));
        assert!(graph.link(TaskId(2), TaskId(3)));

        assert_eq!(graph.lookup_parent(TaskId(3)), Some(TaskId(2)));
    }

    #[test]
    fn test_self_link_is_ignored() {
        let graph = TaskGraph::new();
        assert!(!graph.link(TaskId(1), TaskId(1)));
        assert_eq!(graph.lookup_parent(TaskId(1)), None);
    }

    #[test]
    fn test_link_all_counts_changes() {
        let graph = TaskGraph::new();
        graph.link(TaskId(1), TaskId(2));

        let changed = graph.link_all(TaskId(1), [TaskId(2), TaskId(3), TaskId(4)]);

        assert_eq!(changed, 2);
        for child in [2, 3, 4] {
            assert_eq!(graph.lookup_parent(TaskId(child)), Some(TaskId(1)));
        }
    }

    #[test]
    fn test_register_and_name_task() {
        let graph = TaskGraph::new();
        graph.link(TaskId(1), TaskId(2));
        graph.register_task(TaskId(2), ThreadId(7));
        graph.name_task(TaskId(2), "fetch");

        let node = graph.task(TaskId(2)).unwrap();
        assert_eq!(node.owner_thread, Some(ThreadId(7)));
        assert_eq!(node.parent, Some(TaskId(1)));
        assert_eq!(node.name.as_deref(), Some("fetch"));
    }

    #[test]
    fn test_ancestry_walks_to_root() {
        let graph = TaskGraph::new();
        graph.link(TaskId(1), TaskId(2));
        graph.link(TaskId(2), TaskId(3));

        assert_eq!(graph.ancestry(TaskId(3)), vec![TaskId(3), TaskId(2), TaskId(1)]);
        assert_eq!(graph.ancestry(TaskId(42)), vec![TaskId(42)]);
    }

    #[test]
    fn test_ancestry_stops_on_cycle() {
        let graph = TaskGraph::new();
        graph.link(TaskId(1), TaskId(2));
        graph.link(TaskId(2), TaskId(1));

        assert_eq!(graph.ancestry(TaskId(2)), vec![TaskId(2), TaskId(1)]);
    }

    #[test]
    fn test_bind_loop_replaces_and_notifies() {
        let graph = TaskGraph::new();
        let notices = graph.loop_notices();

        assert_eq!(graph.bind_loop(ThreadId(7), LoopId(40)), None);
        assert_eq!(graph.bind_loop(ThreadId(7), LoopId(41)), Some(LoopId(40)));

        assert_eq!(graph.lookup_loop(ThreadId(7)), Some(LoopId(41)));
        assert_eq!(graph.loop_epoch(), 2);

        let first = notices.try_recv().unwrap();
        assert_eq!(
            first,
            LoopNotice {
                thread_id: ThreadId(7),
                loop_id: LoopId(40),
                previous: None,
            }
        );
        let second = notices.try_recv().unwrap();
        assert_eq!(second.previous, Some(LoopId(40)));
    }

    #[test]
    fn test_rebinding_same_loop_is_silent() {
        let graph = TaskGraph::new();
        let notices = graph.loop_notices();
        graph.bind_loop(ThreadId(7), LoopId(40));
        graph.bind_loop(ThreadId(7), LoopId(40));

        assert_eq!(graph.loop_epoch(), 1);
        assert_eq!(notices.len(), 1);
    }

    #[test]
    fn test_bind_loop_never_blocks_when_queue_full() {
        let graph = TaskGraph::new();
        for i in 0..(LOOP_NOTICE_CAPACITY as u64 + 10) {
            graph.bind_loop(ThreadId(i), LoopId(i));
        }
        assert_eq!(graph.loop_notices().len(), LOOP_NOTICE_CAPACITY);
        assert_eq!(graph.loop_epoch(), LOOP_NOTICE_CAPACITY as u64 + 10);
    }

    #[test]
    fn test_clear_drops_everything() {
        let graph = TaskGraph::new();
        graph.link(TaskId(1), TaskId(2));
        graph.bind_loop(ThreadId(7), LoopId(40));

        graph.clear();

        assert_eq!(graph.task_count(), 0);
        assert_eq!(graph.lookup_loop(ThreadId(7)), None);
        assert!(graph.loop_notices().is_empty());
    }
}
