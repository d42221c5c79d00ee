//! Process-level hooks: stop at exit, restart after fork
//!
//! The exit hook acts on the most recently started [`Session`], held weakly
//! so a dropped session is never kept alive by the process.
//!
//! ## Fork Protocol
//!
//! ```text
//! parent: prepare ──► close pass gate, wait for in-flight passes ──► fork()
//!                                                                     │
//! parent: reopen gate                       child: reopen gate, record pending fork
//!                                                                     │
//!                                     host: Session::after_fork_in_child()
//! ```
//!
//! The child handler runs where only async-signal-safe work is allowed: it
//! touches atomics only. Locks, logging and thread spawning happen later,
//! when the host calls [`Session::after_fork_in_child`].

#![allow(unsafe_code)] // atexit() and pthread_atfork() require unsafe

use log::warn;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once, PoisonError, Weak};
use std::time::{Duration, Instant};

use super::session::Session;
use crate::domain::ThreadId;

static ACTIVE_SESSION: Mutex<Option<Weak<Session>>> = Mutex::new(None);
static EXIT_HOOK: Once = Once::new();
static FORK_HOOK: Once = Once::new();

static GATE_CLOSED: AtomicBool = AtomicBool::new(false);
static PASSES_IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);
static FORK_PENDING: AtomicBool = AtomicBool::new(false);
static FORKING_THREAD: AtomicU64 = AtomicU64::new(0);

/// Upper bound on how long `fork()` waits for a running pass to finish.
const PASS_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

fn set_active(session: &Arc<Session>) {
    let mut slot = ACTIVE_SESSION
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    *slot = Some(Arc::downgrade(session));
}

fn active() -> Option<Arc<Session>> {
    ACTIVE_SESSION
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .and_then(Weak::upgrade)
}

/// Make `session` the active one and make sure it is stopped when the
/// process exits normally. The libc hook itself is registered once.
pub(crate) fn install_exit_hook(session: &Arc<Session>) {
    set_active(session);
    EXIT_HOOK.call_once(|| {
        // SAFETY: `stop_at_exit` is a plain `extern "C" fn()` that never unwinds.
        if unsafe { libc::atexit(stop_at_exit) } != 0 {
            warn!("Could not register exit hook; sampler will not be stopped at exit");
        }
    });
}

extern "C" fn stop_at_exit() {
    let _ = std::panic::catch_unwind(|| {
        if let Some(session) = active() {
            if let Err(e) = session.stop() {
                warn!("Stopping sampler at exit failed: {e}");
            }
        }
    });
}

// =============================================================================
// FORK
// =============================================================================

/// Held for the duration of one sampling pass.
///
/// While any guard is alive a `fork()` waits, so the child never inherits
/// registry locks taken by a pass.
pub(crate) struct PassGuard(());

impl Drop for PassGuard {
    fn drop(&mut self) {
        PASSES_IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Enter a sampling pass, or `None` if a fork is being prepared.
pub(crate) fn enter_pass() -> Option<PassGuard> {
    PASSES_IN_FLIGHT.fetch_add(1, Ordering::SeqCst);
    if GATE_CLOSED.load(Ordering::SeqCst) {
        PASSES_IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
        return None;
    }
    Some(PassGuard(()))
}

/// Record fork children so the host can restart sampling in them.
///
/// Not installed by default: a child that immediately calls `exec` (as
/// `std::process::Command` may) has no use for a sampler. Hosts that fork
/// worker processes opt in, then call [`Session::after_fork_in_child`] in
/// each child.
///
/// Returns false if the hook could not be registered.
pub fn install_fork_hook() -> bool {
    let mut registered = true;
    FORK_HOOK.call_once(|| {
        // SAFETY: all three handlers are plain `extern "C" fn()`s that never unwind.
        let rc = unsafe {
            libc::pthread_atfork(
                Some(close_gate_before_fork),
                Some(reopen_gate_in_parent),
                Some(record_fork_in_child),
            )
        };
        if rc != 0 {
            warn!("pthread_atfork failed with {rc}");
            registered = false;
        }
    });
    registered
}

/// Take the fork recorded in this child, returning the forking thread.
pub(crate) fn take_pending_fork() -> Option<ThreadId> {
    if FORK_PENDING.swap(false, Ordering::AcqRel) {
        Some(ThreadId(FORKING_THREAD.load(Ordering::Acquire)))
    } else {
        None
    }
}

extern "C" fn close_gate_before_fork() {
    GATE_CLOSED.store(true, Ordering::SeqCst);
    let deadline = Instant::now() + PASS_DRAIN_TIMEOUT;
    while PASSES_IN_FLIGHT.load(Ordering::SeqCst) > 0 {
        if Instant::now() > deadline {
            let _ = std::panic::catch_unwind(|| {
                warn!("Forking while a sampling pass is still running");
            });
            break;
        }
        std::thread::yield_now();
    }
}

extern "C" fn reopen_gate_in_parent() {
    GATE_CLOSED.store(false, Ordering::SeqCst);
}

extern "C" fn record_fork_in_child() {
    // Passes counted here ran on threads that do not exist in the child.
    PASSES_IN_FLIGHT.store(0, Ordering::SeqCst);
    let forking = ThreadId::current().0;
    FORKING_THREAD.store(forking, Ordering::Release);
    FORK_PENDING.store(true, Ordering::Release);
    GATE_CLOSED.store(false, Ordering::SeqCst);
}

