//! `TraceLog`: the process-wide (or, for tests, independently constructed)
//! tracing engine binding the category registry, the current buffer, and
//! every registered thread's chunk tenant together.
//!
//! Two locks, never nested the wrong way round: `inner` (a plain `Mutex`)
//! guards lifecycle bookkeeping — registered tenants, thread names,
//! generation counter — while `buffer` (a `parking_lot::RwLock`) guards only
//! the current `TraceBuffer`. The logging fast path in [`TraceLog::log_event`]
//! takes a tenant's slave lock and then, on a chunk miss, the `buffer` lock —
//! never `inner`. This is what lets `stop()` (which holds `inner`) evict a
//! writer via the tenant's *master* lock without ever racing the hot path
//! for `inner` itself.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use parking_lot::RwLock;

use crate::category_registry::{AtomicCategoryStatus, CategoryRegistry};
use crate::chunk_tenant::ChunkTenant;
use crate::error::{PhosphorError, Result};
use crate::platform::current_thread_id;
use crate::stats::StatsCallback;
use crate::trace_argument::TraceArgument;
use crate::trace_buffer::{TraceBuffer, TraceChunk};
use crate::trace_config::{TraceConfig, TraceLogConfig};
use crate::trace_context::TraceContext;
use crate::trace_event::{ARG_COUNT, TraceEvent};
use crate::tracepoint_info::TracepointInfo;

thread_local! {
    /// Keyed by the owning `TraceLog`'s own address so that independently
    /// constructed `TraceLog`s (as tests need, per spec) don't share
    /// tenants despite `thread_local!` storage being process-global. A
    /// `TraceLog` must not be relocated in memory after its first use on a
    /// given thread — see DESIGN.md.
    static TENANTS: RefCell<HashMap<usize, Arc<ChunkTenant>>> = RefCell::new(HashMap::new());
}

struct Inner {
    next_generation: usize,
    current_config: Option<TraceConfig>,
    registered: HashMap<u32, Arc<ChunkTenant>>,
    thread_names: HashMap<u32, String>,
    deregistered_threads: HashSet<u32>,
}

impl Inner {
    fn new() -> Self {
        Inner {
            next_generation: 0,
            current_config: None,
            registered: HashMap::new(),
            thread_names: HashMap::new(),
            deregistered_threads: HashSet::new(),
        }
    }

    fn clear_deregistered_threads(&mut self) {
        for tid in self.deregistered_threads.drain() {
            self.thread_names.remove(&tid);
        }
    }
}

pub struct TraceLog {
    enabled: AtomicBool,
    registry: CategoryRegistry,
    buffer: RwLock<Option<Box<dyn TraceBuffer>>>,
    inner: Mutex<Inner>,
    log_config: TraceLogConfig,
}

impl TraceLog {
    pub fn new() -> Self {
        TraceLog {
            enabled: AtomicBool::new(false),
            registry: CategoryRegistry::new(),
            buffer: RwLock::new(None),
            inner: Mutex::new(Inner::new()),
            log_config: TraceLogConfig::new(),
        }
    }

    /// Builds a `TraceLog` from process-wide settings, starting the
    /// configured startup trace (`PHOSPHOR_TRACING_START`) immediately if
    /// one was present.
    pub fn with_config(log_config: TraceLogConfig) -> Result<Self> {
        let log = TraceLog {
            enabled: AtomicBool::new(false),
            registry: CategoryRegistry::new(),
            buffer: RwLock::new(None),
            inner: Mutex::new(Inner::new()),
            log_config,
        };
        if let Some(startup) = log.log_config.startup_trace.clone() {
            log.start(startup)?;
        }
        Ok(log)
    }

    pub fn sentinel_count(&self) -> u32 {
        self.log_config.sentinel_count
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn tenant_for_self(&self) -> Arc<ChunkTenant> {
        let key = self as *const TraceLog as usize;
        TENANTS.with(|cell| {
            cell.borrow_mut()
                .entry(key)
                .or_insert_with(|| Arc::new(ChunkTenant::new()))
                .clone()
        })
    }

    // -- Lifecycle ---------------------------------------------------

    pub fn start(&self, config: TraceConfig) -> Result<()> {
        let chunk_count = config.buffer_size() / std::mem::size_of::<TraceChunk>();
        if chunk_count < 1 {
            return Err(PhosphorError::InvalidArgument(
                "buffer-size is too small to hold a single chunk".to_string(),
            ));
        }

        let mut inner = self.inner.lock().unwrap();
        if self.enabled.load(Ordering::Acquire) {
            self.stop_locked(&mut inner, false);
        }

        let generation = inner.next_generation;
        inner.next_generation += 1;

        let new_buffer = (config.buffer_factory())(generation, chunk_count);
        *self.buffer.write() = Some(new_buffer);

        self.registry.update_enabled(
            config.enabled_categories().to_vec(),
            config.disabled_categories().to_vec(),
        );

        inner.clear_deregistered_threads();
        inner.current_config = Some(config);
        self.enabled.store(true, Ordering::Release);
        log::info!("phosphor: trace started, generation {generation}");
        Ok(())
    }

    pub fn stop(&self) {
        let mut inner = self.inner.lock().unwrap();
        self.stop_locked(&mut inner, false);
    }

    /// Stops only if `self`'s generation still matches `expected_generation`
    /// — called from the logging fast path when a chunk could not be
    /// obtained, to avoid racing a concurrent `start()`. Never blocks: a
    /// contended `inner` means some other lifecycle operation is already in
    /// flight and will leave the log in a consistent state regardless.
    fn maybe_stop(&self, expected_generation: usize) {
        if let Ok(mut inner) = self.inner.try_lock() {
            if self.buffer.read().as_ref().map(|b| b.generation()) == Some(expected_generation) {
                self.stop_locked(&mut inner, false);
            }
        }
    }

    fn stop_locked(&self, inner: &mut Inner, shutdown: bool) {
        if !self.enabled.swap(false, Ordering::AcqRel) {
            return;
        }
        self.registry.disable_all();
        self.evict_threads(inner);

        let stop_on_destruct = inner
            .current_config
            .as_ref()
            .map(|c| c.stop_tracing_on_destruct())
            .unwrap_or(false);
        let callback = inner
            .current_config
            .as_ref()
            .and_then(|c| c.stopped_callback())
            .cloned();

        if let Some(cb) = callback {
            if !shutdown || stop_on_destruct {
                let context = self.take_context_locked(inner);
                cb.on_stop(&context);
            }
        }
        log::info!("phosphor: trace stopped");
    }

    /// Master-locks every registered tenant and clears its chunk pointer so
    /// no producer can append to a chunk the buffer is about to be read
    /// from. The chunk itself is *not* returned to the buffer: ownership of
    /// every issued chunk now belongs to the frozen buffer for export.
    fn evict_threads(&self, inner: &Inner) {
        for tenant in inner.registered.values() {
            tenant.lock.master_lock();
            unsafe {
                tenant.set_chunk(None);
            }
            tenant.lock.master_unlock();
        }
    }

    fn take_context_locked(&self, inner: &mut Inner) -> TraceContext {
        let buffer = self.buffer.write().take();
        let thread_names = std::mem::take(&mut inner.thread_names);
        TraceContext::new(buffer, thread_names)
    }

    /// Returns the finished trace's buffer and thread names. Fails while a
    /// trace is still enabled, matching the reference implementation's
    /// "can't read from a buffer that's still being written to" invariant.
    pub fn get_trace_context(&self) -> Result<TraceContext> {
        let mut inner = self.inner.lock().unwrap();
        if self.enabled.load(Ordering::Acquire) {
            return Err(PhosphorError::IllegalState(
                "cannot get the trace context while a trace is running".to_string(),
            ));
        }
        Ok(self.take_context_locked(&mut inner))
    }

    pub fn get_buffer(&self) -> Result<Option<Box<dyn TraceBuffer>>> {
        if self.enabled.load(Ordering::Acquire) {
            return Err(PhosphorError::IllegalState(
                "cannot get the buffer while a trace is running".to_string(),
            ));
        }
        Ok(self.buffer.write().take())
    }

    // -- Thread registration ------------------------------------------

    pub fn register_thread(&self, name: impl Into<String>) -> Result<()> {
        let tid = current_thread_id();
        let tenant = self.tenant_for_self();
        if tenant.is_initialised() {
            return Err(PhosphorError::IllegalState(
                "thread is already registered with this trace log".to_string(),
            ));
        }

        let mut inner = self.inner.lock().unwrap();
        tenant.initialised.store(true, Ordering::Release);
        inner.registered.insert(tid, tenant);
        inner.thread_names.insert(tid, name.into());
        inner.deregistered_threads.remove(&tid);
        Ok(())
    }

    pub fn deregister_thread(&self) -> Result<()> {
        let tid = current_thread_id();
        let mut inner = self.inner.lock().unwrap();
        let tenant = inner.registered.remove(&tid).ok_or_else(|| {
            PhosphorError::IllegalState("thread was not registered with this trace log".to_string())
        })?;

        if let Some(chunk) = unsafe { tenant.chunk() } {
            if let Some(buffer) = self.buffer.read().as_ref() {
                buffer.return_chunk(chunk.as_ptr());
            }
            unsafe {
                tenant.set_chunk(None);
            }
        }
        tenant.initialised.store(false, Ordering::Release);

        if self.enabled.load(Ordering::Acquire) {
            inner.deregistered_threads.insert(tid);
        } else {
            inner.thread_names.remove(&tid);
        }
        Ok(())
    }

    // -- Logging fast path ----------------------------------------------

    /// Appends one event. Silently does nothing if tracing is off, if this
    /// thread never registered, if a master eviction is concurrently in
    /// progress, or if no chunk could be obtained — matching spec.md's
    /// "the logging fast path never blocks and never reports failure" rule.
    pub fn log_event(&self, tpi: &'static TracepointInfo, args: [TraceArgument; ARG_COUNT]) {
        if !self.enabled.load(Ordering::Acquire) {
            return;
        }
        let tenant = self.tenant_for_self();
        if !tenant.lock.try_slave_lock() {
            return;
        }
        if !tenant.is_initialised() {
            tenant.lock.slave_unlock();
            return;
        }

        let needs_new_chunk = match unsafe { tenant.chunk() } {
            None => true,
            Some(ptr) => unsafe { (*ptr.as_ptr()).is_full() },
        };

        if needs_new_chunk && !self.replace_chunk(&tenant) {
            let generation = self.buffer.read().as_ref().map(|b| b.generation());
            tenant.lock.slave_unlock();
            if let Some(generation) = generation {
                self.maybe_stop(generation);
            }
            return;
        }

        if let Some(ptr) = unsafe { tenant.chunk() } {
            unsafe {
                (*ptr.as_ptr()).add_event(TraceEvent::new(tpi, args));
            }
        }
        tenant.lock.slave_unlock();
    }

    /// Appends a `Complete` event spanning `[start_nanos, start_nanos +
    /// duration_nanos)`, as used by [`crate::macros::ScopedComplete`].
    pub fn log_complete_event(
        &self,
        tpi: &'static TracepointInfo,
        start_nanos: i64,
        duration_nanos: u64,
        args: [TraceArgument; ARG_COUNT],
    ) {
        if !self.enabled.load(Ordering::Acquire) {
            return;
        }
        let tenant = self.tenant_for_self();
        if !tenant.lock.try_slave_lock() {
            return;
        }
        if !tenant.is_initialised() {
            tenant.lock.slave_unlock();
            return;
        }

        let needs_new_chunk = match unsafe { tenant.chunk() } {
            None => true,
            Some(ptr) => unsafe { (*ptr.as_ptr()).is_full() },
        };

        if needs_new_chunk && !self.replace_chunk(&tenant) {
            let generation = self.buffer.read().as_ref().map(|b| b.generation());
            tenant.lock.slave_unlock();
            if let Some(generation) = generation {
                self.maybe_stop(generation);
            }
            return;
        }

        if let Some(ptr) = unsafe { tenant.chunk() } {
            unsafe {
                (*ptr.as_ptr()).add_event(TraceEvent::new_complete(
                    tpi,
                    start_nanos,
                    duration_nanos,
                    args,
                ));
            }
        }
        tenant.lock.slave_unlock();
    }

    /// Returns the tenant's current chunk to the buffer (if any) and
    /// obtains a fresh one. Returns `false` if tracing has since stopped or
    /// the buffer has none left to give (fixed-mode exhaustion) — in which
    /// case the caller holds no chunk at all afterwards.
    ///
    /// Acquires only `self.buffer`, never `self.inner`: called while the
    /// tenant's slave lock is held, and `inner` must never be taken in that
    /// state (it is what `stop()`'s master-lock eviction is guarded by).
    fn replace_chunk(&self, tenant: &ChunkTenant) -> bool {
        let buffer_guard = self.buffer.read();

        if let Some(old) = unsafe { tenant.chunk() } {
            if let Some(buffer) = buffer_guard.as_ref() {
                buffer.return_chunk(old.as_ptr());
            }
            unsafe {
                tenant.set_chunk(None);
            }
        }

        if !self.enabled.load(Ordering::Acquire) {
            return false;
        }

        match buffer_guard.as_ref() {
            Some(buffer) => match buffer.get_chunk(current_thread_id()) {
                Some(ptr) => {
                    unsafe {
                        tenant.set_chunk(NonNull::new(ptr));
                    }
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    // -- Categories & stats ----------------------------------------------

    pub fn category_status(&self, category_group: &str) -> &AtomicCategoryStatus {
        self.registry.get_status(category_group)
    }

    pub fn stats(&self, cb: &mut dyn StatsCallback) {
        cb.record("enabled", self.is_enabled().into());
        self.registry.stats(cb);
        if let Some(buffer) = self.buffer.read().as_ref() {
            buffer.stats(cb);
        }
    }
}

impl Default for TraceLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TraceLog {
    fn drop(&mut self) {
        if self.enabled.load(Ordering::Acquire) {
            let mut inner = self.inner.lock().unwrap();
            self.stop_locked(&mut inner, true);
        }
    }
}

static GLOBAL: OnceLock<TraceLog> = OnceLock::new();

/// The process-wide trace log, built from `PHOSPHOR_SENTINEL_COUNT` /
/// `PHOSPHOR_TRACING_START` on first use. Instrumentation macros dispatch
/// through this; tests wanting an isolated log should construct their own
/// `TraceLog` instead.
pub fn instance() -> &'static TraceLog {
    GLOBAL.get_or_init(|| {
        TraceLog::with_config(TraceLogConfig::from_env().unwrap_or_default())
            .unwrap_or_else(|_| TraceLog::new())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace_buffer::BufferMode;
    use crate::tracepoint_info::TraceEventType;

    static TPI: TracepointInfo = TracepointInfo::bare("test", "ev", TraceEventType::Instant);

    fn args_none() -> [TraceArgument; ARG_COUNT] {
        [TraceArgument::none(), TraceArgument::none()]
    }

    #[test]
    fn logging_before_start_is_a_silent_no_op() {
        let log = TraceLog::new();
        log.register_thread("t").unwrap();
        log.log_event(&TPI, args_none());
    }

    #[test]
    fn register_then_log_then_stop_yields_one_event() {
        let log = TraceLog::new();
        log.register_thread("t").unwrap();
        log.start(TraceConfig::new(BufferMode::Fixed, 4096 * 4).unwrap())
            .unwrap();
        log.log_event(&TPI, args_none());
        log.stop();

        let ctx = log.get_trace_context().unwrap();
        let total: usize = ctx
            .buffer()
            .map(|b| b.chunks().iter().map(|c| c.count()).sum())
            .unwrap_or(0);
        assert_eq!(total, 1);
    }

    #[test]
    fn fixed_buffer_saturation_stops_accepting_new_chunks_but_keeps_prior_events() {
        let log = TraceLog::new();
        log.register_thread("t").unwrap();
        // One chunk's worth of buffer: only the first chunk's events survive.
        log.start(TraceConfig::new(BufferMode::Fixed, std::mem::size_of::<TraceChunk>()).unwrap())
            .unwrap();

        for _ in 0..(crate::trace_buffer::CHUNK_CAPACITY + 50) {
            log.log_event(&TPI, args_none());
        }
        log.stop();

        let ctx = log.get_trace_context().unwrap();
        let total: usize = ctx
            .buffer()
            .map(|b| b.chunks().iter().map(|c| c.count()).sum())
            .unwrap_or(0);
        assert_eq!(total, crate::trace_buffer::CHUNK_CAPACITY);
    }

    #[test]
    fn double_registration_is_rejected() {
        let log = TraceLog::new();
        log.register_thread("t").unwrap();
        assert!(log.register_thread("t").is_err());
    }

    #[test]
    fn deregister_without_register_is_rejected() {
        let log = TraceLog::new();
        assert!(log.deregister_thread().is_err());
    }

    #[test]
    fn get_trace_context_fails_while_enabled() {
        let log = TraceLog::new();
        log.start(TraceConfig::new(BufferMode::Fixed, 4096 * 4).unwrap())
            .unwrap();
        assert!(log.get_trace_context().is_err());
        log.stop();
        assert!(log.get_trace_context().is_ok());
    }

    #[test]
    fn category_filtering_suppresses_disabled_events() {
        let log = TraceLog::new();
        log.register_thread("t").unwrap();
        let mut config = TraceConfig::new(BufferMode::Fixed, 4096 * 4).unwrap();
        config.set_categories(vec!["enabled_cat".to_string()], vec![]);
        log.start(config).unwrap();

        assert!(log.category_status("enabled_cat").is_enabled());
        assert!(!log.category_status("other_cat").is_enabled());
    }

    #[test]
    fn re_registering_after_deregister_succeeds() {
        let log = TraceLog::new();
        log.register_thread("t").unwrap();
        log.deregister_thread().unwrap();
        log.register_thread("t").unwrap();
    }
}
