//! # Sampling Engine Control
//!
//! The stack-capturing engine is an external collaborator; the hook layer
//! only drives it through [`SamplingEngine`]. This module also provides the
//! cancellation primitive engines use for their run loop ([`StopSignal`]) and
//! a reference engine ([`IntervalSampler`]) that runs a caller-supplied
//! sampling pass at the configured interval.
//!
//! ## Control Protocol
//!
//! ```text
//! set_interval / set_cpu / set_native / set_where   (before first start)
//!        │
//!      init() ──► start()        blocks on a dedicated thread until stop()
//!             └─► start_async()  schedules a cooperative task and returns
//!
//! stop()  idempotent, callable from any thread
//! ```
//!
//! ## Pass Acknowledgement
//!
//! After every completed pass the reference engine calls
//! `ThreadRegistry::complete_pass`, which is what lets exited threads'
//! names be purged safely.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, info};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use threadscope_common::DEFAULT_INTERVAL_US;

use super::process_hooks;
use crate::domain::EngineError;
use crate::tracking::ProfilerContext;

/// Control surface of a sampling engine.
///
/// Configuration setters are only honoured before the first `start` of a
/// session; the hook layer enforces that ordering.
pub trait SamplingEngine: Send + Sync {
    /// Reset internal state from scratch (also used in a forked child).
    fn init(&self) -> Result<(), EngineError>;

    /// Run the sampling loop on the calling thread until stopped.
    fn start(&self) -> Result<(), EngineError>;

    /// Schedule sampling cooperatively inside the current async runtime.
    fn start_async(&self) -> Result<(), EngineError>;

    /// Stop sampling. Must be idempotent and safe from any thread.
    fn stop(&self) -> Result<(), EngineError>;

    fn set_interval(&self, interval_us: u64);
    fn set_cpu(&self, cpu: bool);
    fn set_native(&self, native: bool);
    fn set_where(&self, where_mode: bool);
}

// =============================================================================
// STOP SIGNAL
// =============================================================================

/// One-shot, multi-waiter stop signal.
///
/// Triggering drops the only sender, which disconnects the channel and wakes
/// every waiter at once. Triggering again finds no sender and does nothing.
#[derive(Debug)]
pub struct StopSignal {
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Returns true if this call triggered the signal.
    pub fn trigger(&self) -> bool {
        let mut tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        tx.take().is_some()
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Wait up to `timeout`; returns true if the signal fired.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        matches!(self.rx.recv_timeout(timeout), Err(RecvTimeoutError::Disconnected))
    }
}

// =============================================================================
// REFERENCE ENGINE
// =============================================================================

/// One sampling pass over the tracked threads.
pub type PassFn = dyn Fn(&ProfilerContext) + Send + Sync;

/// Settings pushed by the hook layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub interval_us: u64,
    pub cpu: bool,
    pub native: bool,
    pub where_mode: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            interval_us: DEFAULT_INTERVAL_US,
            cpu: false,
            native: false,
            where_mode: false,
        }
    }
}

/// Stop signal and running flag of one `init` → `stop` cycle.
///
/// A fresh cycle is created by every `init`, so a loop orphaned by `fork()`
/// cannot block the child from starting its own.
#[derive(Debug, Default)]
struct RunCycle {
    stop: StopSignal,
    running: AtomicBool,
}

/// Reference engine: runs a sampling pass every interval.
///
/// The pass itself (capturing and emitting stacks) is supplied by the
/// caller; this type owns the timing, cancellation and the pass
/// acknowledgement to the registry.
pub struct IntervalSampler {
    context: Arc<ProfilerContext>,
    pass: Arc<PassFn>,
    settings: Mutex<EngineSettings>,
    cycle: Mutex<Arc<RunCycle>>,
    passes: Arc<AtomicU64>,
}

impl IntervalSampler {
    pub fn new(
        context: Arc<ProfilerContext>,
        pass: impl Fn(&ProfilerContext) + Send + Sync + 'static,
    ) -> Self {
        Self {
            context,
            pass: Arc::new(pass),
            settings: Mutex::new(EngineSettings::default()),
            cycle: Mutex::new(Arc::new(RunCycle::default())),
            passes: Arc::new(AtomicU64::new(0)),
        }
    }

    #[must_use]
    pub fn settings(&self) -> EngineSettings {
        *self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Passes completed since creation.
    #[must_use]
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.cycle().running.load(Ordering::Acquire)
    }

    fn cycle(&self) -> Arc<RunCycle> {
        Arc::clone(&self.cycle.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn update(&self, apply: impl FnOnce(&mut EngineSettings)) {
        apply(&mut self.settings.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

fn run_pass(context: &ProfilerContext, pass: &PassFn, passes: &AtomicU64) {
    let Some(_guard) = process_hooks::enter_pass() else {
        debug!("Skipping pass while the process forks");
        return;
    };
    pass(context);
    let purged = context.threads().complete_pass();
    if purged > 0 {
        debug!("Purged {purged} exited thread(s) after pass");
    }
    passes.fetch_add(1, Ordering::AcqRel);
}

impl SamplingEngine for IntervalSampler {
    fn init(&self) -> Result<(), EngineError> {
        let mut cycle = self.cycle.lock().unwrap_or_else(PoisonError::into_inner);
        if cycle.running.load(Ordering::Acquire) && !cycle.stop.is_triggered() {
            return Err(EngineError::new("cannot re-initialise a running sampler"));
        }
        *cycle = Arc::new(RunCycle::default());
        Ok(())
    }

    fn start(&self) -> Result<(), EngineError> {
        let cycle = self.cycle();
        if cycle.running.swap(true, Ordering::AcqRel) {
            return Err(EngineError::new("sampler already running"));
        }
        let interval = Duration::from_micros(self.settings().interval_us);
        info!("Sampling every {interval:?} on dedicated thread");

        while !cycle.stop.is_triggered() {
            run_pass(&self.context, self.pass.as_ref(), &self.passes);
            if cycle.stop.wait_timeout(interval) {
                break;
            }
        }

        cycle.running.store(false, Ordering::Release);
        debug!("Sampler loop exited after {} pass(es)", self.passes());
        Ok(())
    }

    fn start_async(&self) -> Result<(), EngineError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| EngineError::new(format!("no async runtime: {e}")))?;
        let cycle = self.cycle();
        if cycle.running.swap(true, Ordering::AcqRel) {
            return Err(EngineError::new("sampler already running"));
        }

        let interval = Duration::from_micros(self.settings().interval_us);
        let context = Arc::clone(&self.context);
        let pass = Arc::clone(&self.pass);
        let passes = Arc::clone(&self.passes);
        info!("Sampling every {interval:?} inside the event loop");

        handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if cycle.stop.is_triggered() {
                    break;
                }
                run_pass(&context, pass.as_ref(), &passes);
            }
            cycle.running.store(false, Ordering::Release);
        });
        Ok(())
    }

    fn stop(&self) -> Result<(), EngineError> {
        if self.cycle().stop.trigger() {
            debug!("Stop signal triggered");
        }
        Ok(())
    }

    fn set_interval(&self, interval_us: u64) {
        self.update(|s| s.interval_us = interval_us);
    }

    fn set_cpu(&self, cpu: bool) {
        self.update(|s| s.cpu = cpu);
    }

    fn set_native(&self, native: bool) {
        self.update(|s| s.native = native);
    }

    fn set_where(&self, where_mode: bool) {
        self.update(|s| s.where_mode = where_mode);
    }
}
