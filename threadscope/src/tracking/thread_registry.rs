//! # Thread Identity Registry
//!
//! Maps runtime thread identifiers to human-readable names for the sampler.
//!
//! ## Lifecycle
//!
//! ```text
//! track(id, name) ──► live ──untrack(id)──► retired ──complete_pass()──► purged
//!                      │  ▲                    │
//!                      └──┘ rename(id, name)   └─ still resolvable as last known name
//! ```
//!
//! A retired entry stays readable until the sampling pass that was running
//! when the thread exited has completed. A sampler that grabbed the id just
//! before the thread went away therefore still resolves the right name.
//!
//! ## Identifier Reuse
//!
//! The OS recycles thread ids. Every `track` stamps a fresh generation taken
//! from a process-monotonic counter, so a reader holding `(id, generation)`
//! can tell a recycled id apart from the thread it originally saw
//! ([`ThreadRegistry::resolve_generation`]).
//!
//! ## Concurrency
//!
//! Entries live in a sharded `DashMap`. A write replaces the whole entry
//! under its shard lock and names are shared as `Arc<str>`, so a reader sees
//! either the previous or the new `{name, generation}` pair, never a mix.

use dashmap::DashMap;
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use threadscope_common::UNKNOWN_THREAD_NAME;

use crate::domain::ThreadId;

#[derive(Debug, Clone)]
struct Entry {
    name: Arc<str>,
    generation: u64,
    /// Completed-pass count observed when the thread exited.
    retired_at: Option<u64>,
}

/// Point-in-time view of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSnapshot {
    pub thread_id: ThreadId,
    pub name: Arc<str>,
    pub generation: u64,
    pub alive: bool,
}

/// Process-scoped thread id → name registry.
#[derive(Debug)]
pub struct ThreadRegistry {
    entries: DashMap<ThreadId, Entry>,
    next_generation: AtomicU64,
    completed_passes: AtomicU64,
    unknown: Arc<str>,
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_generation: AtomicU64::new(1),
            completed_passes: AtomicU64::new(0),
            unknown: Arc::from(UNKNOWN_THREAD_NAME),
        }
    }

    /// Insert or overwrite the live entry for `thread_id`.
    ///
    /// Returns the generation stamped on the new entry.
    pub fn track(&self, thread_id: ThreadId, name: &str) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let entry = Entry {
            name: Arc::from(name),
            generation,
            retired_at: None,
        };

        if let Some(previous) = self.entries.insert(thread_id, entry) {
            if previous.retired_at.is_some() {
                debug!("{thread_id} reused (was {:?}), now {name:?}", previous.name);
            }
        }
        debug!("Tracking {thread_id} as {name:?} (generation {generation})");
        generation
    }

    /// Rename a live thread, keeping its generation.
    ///
    /// Returns false if the thread is unknown or has already exited.
    pub fn rename(&self, thread_id: ThreadId, name: &str) -> bool {
        match self.entries.get_mut(&thread_id) {
            Some(mut entry) if entry.retired_at.is_none() => {
                entry.name = Arc::from(name);
                true
            }
            _ => false,
        }
    }

    /// Mark a thread as exited.
    ///
    /// The entry keeps resolving to its last known name until the current
    /// sampling pass completes (see [`ThreadRegistry::complete_pass`]).
    pub fn untrack(&self, thread_id: ThreadId) {
        let pass = self.completed_passes.load(Ordering::Acquire);
        if let Some(mut entry) = self.entries.get_mut(&thread_id) {
            if entry.retired_at.is_none() {
                entry.retired_at = Some(pass);
                debug!("Untracking {thread_id} ({:?})", entry.name);
            }
        }
    }

    /// Acknowledge that the sampler finished one full pass over all threads.
    ///
    /// Purges every entry retired before or during the pass just completed.
    /// Returns the number of purged entries.
    pub fn complete_pass(&self) -> usize {
        let finished = self.completed_passes.fetch_add(1, Ordering::AcqRel);
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.retired_at.map_or(true, |retired| retired > finished));
        before.saturating_sub(self.entries.len())
    }

    /// Name for `thread_id`, or the unknown sentinel.
    #[must_use]
    pub fn resolve(&self, thread_id: ThreadId) -> Arc<str> {
        self.entries
            .get(&thread_id)
            .map_or_else(|| Arc::clone(&self.unknown), |entry| Arc::clone(&entry.name))
    }

    /// Name for `thread_id` only if its entry still carries `generation`.
    ///
    /// Returns `None` when the id has since been reused by another thread
    /// or the entry was purged.
    #[must_use]
    pub fn resolve_generation(&self, thread_id: ThreadId, generation: u64) -> Option<Arc<str>> {
        self.entries
            .get(&thread_id)
            .filter(|entry| entry.generation == generation)
            .map(|entry| Arc::clone(&entry.name))
    }

    #[must_use]
    pub fn lookup(&self, thread_id: ThreadId) -> Option<ThreadSnapshot> {
        self.entries.get(&thread_id).map(|entry| snapshot(thread_id, &entry))
    }

    /// Snapshot of all entries (live and retired), ordered by thread id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ThreadSnapshot> {
        let mut threads: Vec<ThreadSnapshot> = self
            .entries
            .iter()
            .map(|item| snapshot(*item.key(), item.value()))
            .collect();
        threads.sort_unstable_by_key(|t| t.thread_id);
        threads
    }

    /// Snapshot of live entries only, ordered by thread id.
    #[must_use]
    pub fn live_threads(&self) -> Vec<ThreadSnapshot> {
        let mut threads = self.snapshot();
        threads.retain(|t| t.alive);
        threads
    }

    /// Drop every entry except `keep`.
    ///
    /// Used in a forked child, where only the forking thread survives.
    pub fn retain_only(&self, keep: ThreadId) {
        self.entries.retain(|thread_id, _| *thread_id == keep);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn completed_passes(&self) -> u64 {
        self.completed_passes.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn snapshot(thread_id: ThreadId, entry: &Entry) -> ThreadSnapshot {
    ThreadSnapshot {
        thread_id,
        name: Arc::clone(&entry.name),
        generation: entry.generation,
        alive: entry.retired_at.is_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_after_track() {
        let registry = ThreadRegistry::new();
        registry.track(ThreadId(1), "MainThread");

        assert_eq!(&*registry.resolve(ThreadId(1)), "MainThread");
    }

    #[test]
    fn test_resolve_unknown_returns_sentinel() {
        let registry = ThreadRegistry::new();
        assert_eq!(&*registry.resolve(ThreadId(42)), UNKNOWN_THREAD_NAME);
    }

    #[test]
    fn test_untrack_keeps_last_known_name_until_pass_completes() {
        let registry = ThreadRegistry::new();
        registry.track(ThreadId(1), "Worker-1");
        registry.untrack(ThreadId(1));

        assert_eq!(&*registry.resolve(ThreadId(1)), "Worker-1");
        assert!(!registry.lookup(ThreadId(1)).unwrap().alive);

        assert_eq!(registry.complete_pass(), 1);
        assert_eq!(&*registry.resolve(ThreadId(1)), UNKNOWN_THREAD_NAME);
    }

    #[test]
    fn test_complete_pass_keeps_live_entries() {
        let registry = ThreadRegistry::new();
        registry.track(ThreadId(1), "MainThread");
        registry.track(ThreadId(2), "Worker-1");
        registry.untrack(ThreadId(2));

        registry.complete_pass();

        assert_eq!(registry.len(), 1);
        assert_eq!(&*registry.resolve(ThreadId(1)), "MainThread");
    }

    #[test]
    fn test_retrack_after_untrack_revives_entry() {
        let registry = ThreadRegistry::new();
        registry.track(ThreadId(7), "Worker-1");
        registry.untrack(ThreadId(7));
        registry.track(ThreadId(7), "Worker-2");

        registry.complete_pass();

        assert_eq!(&*registry.resolve(ThreadId(7)), "Worker-2");
        assert!(registry.lookup(ThreadId(7)).unwrap().alive);
    }

    #[test]
    fn test_reused_id_rejects_stale_generation() {
        let registry = ThreadRegistry::new();
        let old = registry.track(ThreadId(7), "Worker-1");
        registry.untrack(ThreadId(7));
        let new = registry.track(ThreadId(7), "Worker-2");

        assert_ne!(old, new);
        assert_eq!(registry.resolve_generation(ThreadId(7), old), None);
        assert_eq!(registry.resolve_generation(ThreadId(7), new).as_deref(), Some("Worker-2"));
    }

    #[test]
    fn test_generations_are_monotonic() {
        let registry = ThreadRegistry::new();
        let a = registry.track(ThreadId(1), "a");
        let b = registry.track(ThreadId(2), "b");
        let c = registry.track(ThreadId(1), "c");
        assert!(a < b && b < c);
    }

    #[test]
    fn test_rename_only_applies_to_live_threads() {
        let registry = ThreadRegistry::new();
        let generation = registry.track(ThreadId(3), "Thread-3");

        assert!(registry.rename(ThreadId(3), "Downloader"));
        assert_eq!(
            registry.resolve_generation(ThreadId(3), generation).as_deref(),
            Some("Downloader")
        );

        registry.untrack(ThreadId(3));
        assert!(!registry.rename(ThreadId(3), "Zombie"));
        assert!(!registry.rename(ThreadId(99), "Nobody"));
        assert_eq!(&*registry.resolve(ThreadId(3)), "Downloader");
    }

    #[test]
    fn test_retain_only_keeps_single_thread() {
        let registry = ThreadRegistry::new();
        registry.track(ThreadId(1), "MainThread");
        registry.track(ThreadId(2), "Worker-1");
        registry.track(ThreadId(3), "Worker-2");

        registry.retain_only(ThreadId(2));

        assert_eq!(registry.len(), 1);
        assert_eq!(&*registry.resolve(ThreadId(2)), "Worker-1");
    }

    #[test]
    fn test_live_threads_excludes_retired() {
        let registry = ThreadRegistry::new();
        registry.track(ThreadId(2), "Worker-1");
        registry.track(ThreadId(1), "MainThread");
        registry.untrack(ThreadId(2));

        let live = registry.live_threads();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].thread_id, ThreadId(1));
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_names() {
        let registry = Arc::new(ThreadRegistry::new());
        registry.track(ThreadId(1), "name-0-0");

        let writer = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                for i in 0..2000 {
                    registry.track(ThreadId(1), &format!("name-{i}-{i}"));
                    if i % 3 == 0 {
                        registry.untrack(ThreadId(1));
                    }
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..2000 {
                        let name = registry.resolve(ThreadId(1));
                        if &*name == UNKNOWN_THREAD_NAME {
                            continue;
                        }
                        let parts: Vec<&str> = name.split('-').collect();
                        assert_eq!(parts.len(), 3, "torn name {name:?}");
                        assert_eq!(parts[1], parts[2], "torn name {name:?}");
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
