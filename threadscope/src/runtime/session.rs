//! # Profiling Session (Runtime Hook Layer)
//!
//! A [`Session`] ties one [`ProfilerContext`] to one sampling engine. It
//! receives lifecycle events from the host runtime, keeps the registries
//! current, and owns the engine's start/stop lifecycle.
//!
//! ## Failure Policy
//!
//! - Tracking is best-effort instrumentation. [`Session::dispatch`], [`Session::instrument`] and
//!   [`Session::instrument_before`] log hook failures (including panics) and never
//!   let them reach the program being profiled.
//! - Control failures (engine init/start/stop) are returned to whoever
//!   called [`Session::start`], [`Session::stop`] or
//!   [`Session::restart_after_fork`]. Nothing is retried.
//!
//! ## Sampler Context
//!
//! Each (re)start launches exactly one sampler execution context, chosen by
//! [`SamplingMode`]:
//! - `Thread`: a dedicated OS thread named `threadscope.sampler` running
//!   the engine's blocking loop
//! - `Stealth`: the engine's cooperative variant, scheduled on the tokio
//!   runtime the caller is running in
//!
//! ## Fork Protocol
//!
//! In a forked child the inherited sampler is invalid: its thread does not
//! exist and its state describes the parent. The child stops the engine,
//! drops every identity except the forking thread, re-initialises the engine
//! and starts sampling again. With [`install_fork_hook`](super::install_fork_hook)
//! installed the host triggers this through [`Session::after_fork_in_child`].
//!
//! ## Start/Stop Ordering
//!
//! `start` and `stop` are serialised by a control lock, so a `stop` racing a
//! `start` always sees, and stops, the sampler that `start` launched. The
//! sampler thread is joined after the lock is released.

use log::{debug, error, info, warn};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use threadscope_common::SAMPLER_THREAD_NAME;

use super::engine::SamplingEngine;
use super::events::{ForkRole, RuntimeEvent};
use super::process_hooks;
use crate::config::{SamplerConfig, SamplingMode};
use crate::domain::{ControlError, HookError, ThreadId};
use crate::tracking::ProfilerContext;

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Name recorded for the thread that bootstraps the session when the host
/// did not name it.
const BOOTSTRAP_THREAD_NAME: &str = "MainThread";

pub struct Session {
    context: Arc<ProfilerContext>,
    engine: Arc<dyn SamplingEngine>,
    config: Mutex<SamplerConfig>,
    /// Configuration is locked once the first start was attempted.
    config_locked: AtomicBool,
    state: AtomicU8,
    /// Serialises `start` and `stop`.
    control: Mutex<()>,
    sampler_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub fn new(context: Arc<ProfilerContext>, engine: Arc<dyn SamplingEngine>) -> Self {
        Self {
            context,
            engine,
            config: Mutex::new(SamplerConfig::default()),
            config_locked: AtomicBool::new(false),
            state: AtomicU8::new(STATE_IDLE),
            control: Mutex::new(()),
            sampler_thread: Mutex::new(None),
        }
    }

    /// Create a session, track the calling thread, apply `config` and start
    /// sampling.
    ///
    /// # Errors
    /// Returns the configuration or control error that prevented sampling.
    pub fn bootstrap(
        context: Arc<ProfilerContext>,
        engine: Arc<dyn SamplingEngine>,
        config: SamplerConfig,
    ) -> Result<Arc<Self>, ControlError> {
        let session = Arc::new(Self::new(context, engine));

        let current = std::thread::current();
        let name = current.name().unwrap_or(BOOTSTRAP_THREAD_NAME);
        session.context.threads().track(ThreadId::current(), name);

        session.configure(config)?;
        session.start()?;
        Ok(session)
    }

    #[must_use]
    pub fn context(&self) -> &Arc<ProfilerContext> {
        &self.context
    }

    #[must_use]
    pub fn config(&self) -> SamplerConfig {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_RUNNING
    }

    // =========================================================================
    // Control lifecycle
    // =========================================================================

    /// Replace the sampler configuration.
    ///
    /// # Errors
    /// [`ControlError::ConfigLocked`] once sampling was started in this
    /// session; [`ControlError::InvalidConfig`] for invalid settings.
    pub fn configure(&self, config: SamplerConfig) -> Result<(), ControlError> {
        if self.config_locked.load(Ordering::Acquire) {
            return Err(ControlError::ConfigLocked);
        }
        config.validate()?;
        let mut current = self.config.lock().unwrap_or_else(PoisonError::into_inner);
        *current = config;
        Ok(())
    }

    /// Push the configuration into the engine and launch the sampler.
    ///
    /// Registers the process-exit hook on first use, before anything can
    /// fail, so the engine is stopped at exit even after a failed start.
    ///
    /// # Errors
    /// Returns [`ControlError::AlreadyRunning`] if sampling is active, or the
    /// engine/spawn failure that prevented the start.
    pub fn start(self: &Arc<Self>) -> Result<(), ControlError> {
        process_hooks::install_exit_hook(self);
        self.config_locked.store(true, Ordering::Release);

        let _control = self.control();
        let previous = self.state.swap(STATE_RUNNING, Ordering::AcqRel);
        if previous == STATE_RUNNING {
            return Err(ControlError::AlreadyRunning);
        }

        match self.launch() {
            Ok(()) => Ok(()),
            Err(e) => {
                // Idle rather than stopped: stop() must still reach the engine.
                self.state.store(STATE_IDLE, Ordering::Release);
                Err(e)
            }
        }
    }

    fn launch(&self) -> Result<(), ControlError> {
        let config = self.config();

        self.engine.set_interval(config.interval_us);
        self.engine.set_cpu(config.cpu);
        self.engine.set_native(config.native);
        self.engine.set_where(config.where_mode);
        self.engine.init().map_err(ControlError::InitFailed)?;

        match config.mode {
            SamplingMode::Thread => {
                let engine = Arc::clone(&self.engine);
                let handle = std::thread::Builder::new()
                    .name(SAMPLER_THREAD_NAME.to_string())
                    .spawn(move || {
                        if let Err(e) = engine.start() {
                            error!("Sampler loop failed: {e}");
                        }
                    })?;
                *self.sampler_thread() = Some(handle);
            }
            SamplingMode::Stealth => {
                if tokio::runtime::Handle::try_current().is_err() {
                    return Err(ControlError::NoAsyncRuntime);
                }
                self.engine
                    .start_async()
                    .map_err(ControlError::StartFailed)?;
            }
        }

        info!(
            "Sampling started ({:?} mode, every {}us)",
            config.mode, config.interval_us
        );
        Ok(())
    }

    /// Stop sampling. A second call is a no-op.
    ///
    /// Safe to call from any thread, including the sampler thread itself
    /// and the process-exit hook.
    ///
    /// # Errors
    /// Returns [`ControlError::StopFailed`] if the engine refused to stop.
    pub fn stop(&self) -> Result<(), ControlError> {
        let handle = {
            let _control = self.control();
            if self.state.swap(STATE_STOPPED, Ordering::AcqRel) == STATE_STOPPED {
                return Ok(());
            }
            self.engine.stop().map_err(ControlError::StopFailed)?;
            self.sampler_thread().take()
        };

        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                debug!("stop() called from the sampler thread, not joining");
            } else if handle.join().is_err() {
                warn!("Sampler thread panicked");
            }
        }

        info!("Sampling stopped");
        Ok(())
    }

    /// Re-establish sampling in a forked child.
    ///
    /// # Errors
    /// Returns the control error that prevented re-initialisation or restart.
    /// The child program itself is unaffected.
    pub fn restart_after_fork(
        self: &Arc<Self>,
        forking_thread: ThreadId,
    ) -> Result<(), ControlError> {
        info!("Restarting sampler in forked child");

        if let Err(e) = self.engine.stop() {
            warn!("Inherited sampler refused to stop: {e}");
        }
        {
            let _control = self.control();
            // The parent's sampler thread does not exist here; its handle must not be joined.
            if let Some(handle) = self.sampler_thread().take() {
                std::mem::forget(handle);
            }
            self.context.reset_after_fork(forking_thread);
            self.state.store(STATE_IDLE, Ordering::Release);
        }
        self.start()
    }

    /// Complete a fork recorded by the fork hook.
    ///
    /// Call in the child, once `fork()` has returned, before relying on
    /// samples from it. Returns true if a fork was pending and sampling was
    /// restarted; failures are logged like any other lifecycle event.
    pub fn after_fork_in_child(self: &Arc<Self>) -> bool {
        match process_hooks::take_pending_fork() {
            Some(thread_id) => self.dispatch(&RuntimeEvent::Forked {
                role: ForkRole::Child,
                thread_id,
            }),
            None => {
                debug!("No fork pending in this process");
                false
            }
        }
    }

    // =========================================================================
    // Lifecycle events
    // =========================================================================

    /// Apply one lifecycle event to the registries.
    ///
    /// # Errors
    /// Returns a [`HookError`] describing why the event could not be applied.
    pub fn handle(self: &Arc<Self>, event: &RuntimeEvent) -> Result<(), HookError> {
        let threads = self.context.threads();
        let tasks = self.context.tasks();

        match event {
            RuntimeEvent::ThreadCreated { thread_id, name } => {
                threads.track(*thread_id, name);
            }
            RuntimeEvent::ThreadRenamed { thread_id, name } => {
                if !threads.rename(*thread_id, name) {
                    debug!("Rename of untracked {thread_id}, tracking it as {name:?}");
                    threads.track(*thread_id, name);
                }
            }
            RuntimeEvent::ThreadExiting { thread_id } => threads.untrack(*thread_id),
            RuntimeEvent::TaskCreated { task_id, thread_id } => {
                tasks.register_task(*task_id, *thread_id);
            }
            RuntimeEvent::TaskNamed { task_id, name } => tasks.name_task(*task_id, name),
            RuntimeEvent::LoopBound { thread_id, loop_id } => {
                tasks.bind_loop(*thread_id, *loop_id);
            }
            RuntimeEvent::TasksGathered { parent, children } => {
                tasks.link_all(*parent, children.iter().copied());
                if children.contains(parent) {
                    return Err(HookError::TrackingFailed {
                        event: event.kind().to_string(),
                        reason: format!("{parent} listed as its own child"),
                    });
                }
            }
            RuntimeEvent::Forked { role: ForkRole::Parent, .. } => {
                debug!("Fork observed in parent, nothing to do");
            }
            RuntimeEvent::Forked { role: ForkRole::Child, thread_id } => {
                self.restart_after_fork(*thread_id)?;
            }
        }
        Ok(())
    }

    /// Apply an event best-effort: failures and panics are logged, never
    /// propagated.
    ///
    /// Returns true if the event was applied.
    pub fn dispatch(self: &Arc<Self>, event: &RuntimeEvent) -> bool {
        match catch_unwind(AssertUnwindSafe(|| self.handle(event))) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                if matches!(event, RuntimeEvent::Forked { .. }) {
                    error!("{e}");
                } else {
                    warn!("{e}");
                }
                false
            }
            Err(payload) => {
                let e = HookError::Panicked {
                    event: event.kind().to_string(),
                    message: panic_message(&payload),
                };
                warn!("{e}");
                false
            }
        }
    }

    /// Run a runtime operation, then report the event it produced.
    ///
    /// `event` derives the lifecycle event from the operation's result (for
    /// instance the identifier a thread was just given). The operation's
    /// result is returned whatever happens to the event.
    pub fn instrument<R>(
        self: &Arc<Self>,
        op: impl FnOnce() -> R,
        event: impl FnOnce(&R) -> Option<RuntimeEvent>,
    ) -> R {
        let result = op();
        match catch_unwind(AssertUnwindSafe(|| event(&result))) {
            Ok(Some(event)) => {
                self.dispatch(&event);
            }
            Ok(None) => {}
            Err(payload) => warn!(
                "Deriving lifecycle event panicked: {}",
                panic_message(&payload)
            ),
        }
        result
    }

    /// Report an event, then run the runtime operation it announces.
    pub fn instrument_before<R>(
        self: &Arc<Self>,
        event: &RuntimeEvent,
        op: impl FnOnce() -> R,
    ) -> R {
        self.dispatch(event);
        op()
    }

    fn control(&self) -> MutexGuard<'_, ()> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sampler_thread(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.sampler_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EngineError, TaskId};
    use crate::runtime::IntervalSampler;
    use std::sync::atomic::{AtomicU64, AtomicUsize};
    use std::time::Duration;

    /// Engine that counts calls; `init` fails on the calls listed in `failing_inits`.
    #[derive(Default)]
    struct CountingEngine {
        inits: AtomicUsize,
        starts: AtomicUsize,
        async_starts: AtomicUsize,
        stops: AtomicUsize,
        interval: AtomicU64,
        failing_inits: Vec<usize>,
    }

    impl CountingEngine {
        fn failing_on(calls: &[usize]) -> Self {
            Self {
                failing_inits: calls.to_vec(),
                ..Self::default()
            }
        }

        fn count(counter: &AtomicUsize) -> usize {
            counter.load(Ordering::SeqCst)
        }
    }

    impl SamplingEngine for CountingEngine {
        fn init(&self) -> Result<(), EngineError> {
            let call = self.inits.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing_inits.contains(&call) {
                return Err(EngineError::new("no timer available"));
            }
            Ok(())
        }
        fn start(&self) -> Result<(), EngineError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn start_async(&self) -> Result<(), EngineError> {
            self.async_starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn stop(&self) -> Result<(), EngineError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn set_interval(&self, interval_us: u64) {
            self.interval.store(interval_us, Ordering::SeqCst);
        }
        fn set_cpu(&self, _cpu: bool) {}
        fn set_native(&self, _native: bool) {}
        fn set_where(&self, _where_mode: bool) {}
    }

    /// Interval sampler whose `init` is slow, leaving a window inside `start`.
    struct SlowInit {
        inner: IntervalSampler,
        init_entered: AtomicBool,
    }

    impl SamplingEngine for SlowInit {
        fn init(&self) -> Result<(), EngineError> {
            self.init_entered.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(200));
            self.inner.init()
        }
        fn start(&self) -> Result<(), EngineError> {
            self.inner.start()
        }
        fn start_async(&self) -> Result<(), EngineError> {
            self.inner.start_async()
        }
        fn stop(&self) -> Result<(), EngineError> {
            self.inner.stop()
        }
        fn set_interval(&self, interval_us: u64) {
            self.inner.set_interval(interval_us);
        }
        fn set_cpu(&self, cpu: bool) {
            self.inner.set_cpu(cpu);
        }
        fn set_native(&self, native: bool) {
            self.inner.set_native(native);
        }
        fn set_where(&self, where_mode: bool) {
            self.inner.set_where(where_mode);
        }
    }

    fn session_with(engine: CountingEngine) -> (Arc<Session>, Arc<CountingEngine>) {
        let engine = Arc::new(engine);
        let session = Arc::new(Session::new(
            Arc::new(ProfilerContext::new()),
            engine.clone(),
        ));
        (session, engine)
    }

    fn every(micros: u64) -> SamplerConfig {
        SamplerConfig::default().with_interval(Duration::from_micros(micros))
    }

    fn stealth() -> SamplerConfig {
        SamplerConfig::default().with_mode(SamplingMode::Stealth)
    }

    fn forked(role: ForkRole, thread_id: ThreadId) -> RuntimeEvent {
        RuntimeEvent::Forked { role, thread_id }
    }

    fn named(thread_id: ThreadId, name: &str) -> RuntimeEvent {
        RuntimeEvent::ThreadCreated {
            thread_id,
            name: name.to_string(),
        }
    }

    fn renamed(thread_id: ThreadId, name: &str) -> RuntimeEvent {
        RuntimeEvent::ThreadRenamed {
            thread_id,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_start_pushes_configuration() {
        let (session, engine) = session_with(CountingEngine::default());
        session.configure(every(250)).unwrap();
        session.start().unwrap();

        assert!(session.is_running());
        assert_eq!(engine.interval.load(Ordering::SeqCst), 250);
        assert_eq!(CountingEngine::count(&engine.inits), 1);

        session.stop().unwrap();
        // Joined on stop, so the sampler thread has run.
        assert_eq!(CountingEngine::count(&engine.starts), 1);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (session, engine) = session_with(CountingEngine::default());
        session.start().unwrap();

        session.stop().unwrap();
        session.stop().unwrap();

        assert!(!session.is_running());
        assert_eq!(CountingEngine::count(&engine.stops), 1);
    }

    #[test]
    fn test_stop_without_start_still_stops_engine_once() {
        let (session, engine) = session_with(CountingEngine::default());
        session.stop().unwrap();
        session.stop().unwrap();
        assert_eq!(CountingEngine::count(&engine.stops), 1);
    }

    #[test]
    fn test_failed_start_propagates_and_allows_stop() {
        let (session, engine) = session_with(CountingEngine::failing_on(&[1]));

        let err = session.start().unwrap_err();
        assert!(matches!(err, ControlError::InitFailed(_)));
        assert!(!session.is_running());
        assert_eq!(CountingEngine::count(&engine.starts), 0);

        session.stop().unwrap();
        assert_eq!(CountingEngine::count(&engine.stops), 1);
    }

    #[test]
    fn test_stop_during_start_stops_launched_sampler() {
        let context = Arc::new(ProfilerContext::new());
        let engine = Arc::new(SlowInit {
            inner: IntervalSampler::new(Arc::clone(&context), |_| {}),
            init_entered: AtomicBool::new(false),
        });
        let session = Arc::new(Session::new(context, engine.clone()));
        session.configure(every(200)).unwrap();

        let starter = {
            let session = Arc::clone(&session);
            std::thread::spawn(move || session.start())
        };
        while !engine.init_entered.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }
        session.stop().unwrap();
        starter.join().unwrap().unwrap();

        assert!(!session.is_running());
        assert!(!engine.inner.is_running());
        let passes = engine.inner.passes();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(engine.inner.passes(), passes);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let (session, _engine) = session_with(CountingEngine::default());
        session.start().unwrap();
        assert!(matches!(session.start(), Err(ControlError::AlreadyRunning)));
        session.stop().unwrap();
    }

    #[test]
    fn test_configuration_locked_after_start() {
        let (session, _engine) = session_with(CountingEngine::default());
        session.configure(every(500)).unwrap();
        session.start().unwrap();

        let err = session.configure(every(100)).unwrap_err();
        assert!(matches!(err, ControlError::ConfigLocked));
        assert_eq!(session.config().interval_us, 500);
        session.stop().unwrap();
    }

    #[test]
    fn test_configure_rejects_zero_interval() {
        let (session, _engine) = session_with(CountingEngine::default());
        let err = session.configure(every(0)).unwrap_err();
        assert!(matches!(err, ControlError::InvalidConfig(_)));
    }

    #[test]
    fn test_stealth_mode_requires_runtime() {
        let (session, engine) = session_with(CountingEngine::default());
        session.configure(stealth()).unwrap();

        assert!(matches!(session.start(), Err(ControlError::NoAsyncRuntime)));
        assert_eq!(CountingEngine::count(&engine.async_starts), 0);
    }

    #[tokio::test]
    async fn test_stealth_mode_uses_async_variant() {
        let (session, engine) = session_with(CountingEngine::default());
        session.configure(stealth()).unwrap();
        session.start().unwrap();

        assert_eq!(CountingEngine::count(&engine.async_starts), 1);
        assert_eq!(CountingEngine::count(&engine.starts), 0);
        session.stop().unwrap();
    }

    #[test]
    fn test_bootstrap_tracks_calling_thread() {
        let engine = Arc::new(CountingEngine::default());
        let session = Session::bootstrap(
            Arc::new(ProfilerContext::new()),
            engine,
            SamplerConfig::default(),
        )
        .unwrap();

        let name = session.context().threads().resolve(ThreadId::current());
        let expected = std::thread::current()
            .name()
            .unwrap_or(BOOTSTRAP_THREAD_NAME)
            .to_string();
        assert_eq!(&*name, expected);
        session.stop().unwrap();
    }

    #[test]
    fn test_thread_events_update_registry() {
        let (session, _engine) = session_with(CountingEngine::default());
        let tid = ThreadId(42);

        assert!(session.dispatch(&named(tid, "Thread-1")));
        assert!(session.dispatch(&renamed(tid, "Worker-1")));
        assert_eq!(&*session.context().threads().resolve(tid), "Worker-1");

        assert!(session.dispatch(&RuntimeEvent::ThreadExiting { thread_id: tid }));
        assert!(!session.context().threads().lookup(tid).unwrap().alive);
    }

    #[test]
    fn test_rename_of_untracked_thread_tracks_it() {
        let (session, _engine) = session_with(CountingEngine::default());
        let tid = ThreadId(7);
        assert!(session.dispatch(&renamed(tid, "late")));
        assert_eq!(&*session.context().threads().resolve(tid), "late");
    }

    #[test]
    fn test_gather_links_every_child() {
        let (session, _engine) = session_with(CountingEngine::default());
        let parent = TaskId(1);
        let event = RuntimeEvent::TasksGathered {
            parent,
            children: vec![TaskId(2), TaskId(3)],
        };

        assert!(session.dispatch(&event));
        let tasks = session.context().tasks();
        assert_eq!(tasks.lookup_parent(TaskId(2)), Some(parent));
        assert_eq!(tasks.lookup_parent(TaskId(3)), Some(parent));
    }

    #[test]
    fn test_gather_including_parent_is_reported_not_raised() {
        let (session, _engine) = session_with(CountingEngine::default());
        let parent = TaskId(1);
        let event = RuntimeEvent::TasksGathered {
            parent,
            children: vec![TaskId(2), parent],
        };

        assert!(matches!(session.handle(&event), Err(HookError::TrackingFailed { .. })));
        assert!(!session.dispatch(&event));
        let tasks = session.context().tasks();
        assert_eq!(tasks.lookup_parent(TaskId(2)), Some(parent));
    }

    #[test]
    fn test_fork_child_keeps_only_forking_thread() {
        let (session, engine) = session_with(CountingEngine::default());
        let threads = session.context().threads();
        threads.track(ThreadId(1), "MainThread");
        threads.track(ThreadId(2), "Worker-1");
        threads.track(ThreadId(3), "Worker-2");
        session.context().tasks().link(TaskId(1), TaskId(2));
        session.start().unwrap();

        assert!(session.dispatch(&forked(ForkRole::Child, ThreadId(1))));

        let threads = session.context().threads();
        assert_eq!(threads.len(), 1);
        assert_eq!(&*threads.resolve(ThreadId(1)), "MainThread");
        assert_eq!(session.context().tasks().task_count(), 0);
        assert_eq!(CountingEngine::count(&engine.inits), 2);
        assert!(session.is_running());
        session.stop().unwrap();
    }

    #[test]
    fn test_fork_parent_changes_nothing() {
        let (session, engine) = session_with(CountingEngine::default());
        session.context().threads().track(ThreadId(2), "Worker-1");

        assert!(session.dispatch(&forked(ForkRole::Parent, ThreadId(1))));
        assert_eq!(session.context().threads().len(), 1);
        assert_eq!(CountingEngine::count(&engine.inits), 0);
    }

    #[test]
    fn test_failed_fork_restart_is_swallowed() {
        let (session, engine) = session_with(CountingEngine::failing_on(&[2]));
        session.start().unwrap();

        assert!(!session.dispatch(&forked(ForkRole::Child, ThreadId(1))));
        assert!(!session.is_running());
        assert_eq!(CountingEngine::count(&engine.inits), 2);
    }

    #[test]
    fn test_instrument_reports_result() {
        let (session, _engine) = session_with(CountingEngine::default());

        let tid = session.instrument(
            || ThreadId(99),
            |tid| Some(named(*tid, "Thread-9")),
        );

        assert_eq!(tid, ThreadId(99));
        assert_eq!(&*session.context().threads().resolve(tid), "Thread-9");
    }

    #[test]
    fn test_instrument_survives_panicking_hook() {
        let (session, _engine) = session_with(CountingEngine::default());
        let value = session.instrument(
            || 17,
            |_| -> Option<RuntimeEvent> { panic!("hook exploded") },
        );
        assert_eq!(value, 17);
    }

    #[test]
    fn test_instrument_before_records_event_first() {
        let (session, _engine) = session_with(CountingEngine::default());
        let tid = ThreadId(5);
        session.context().threads().track(tid, "Worker-5");

        let exiting = RuntimeEvent::ThreadExiting { thread_id: tid };
        let seen_alive = session.instrument_before(&exiting, || {
            let threads = session.context().threads();
            threads.lookup(tid).map(|snapshot| snapshot.alive)
        });

        assert_eq!(seen_alive, Some(false));
    }

    #[test]
    fn test_panic_message_extracts_payload() {
        let payload = catch_unwind(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(panic_message(&payload), "boom 1");
    }
}
