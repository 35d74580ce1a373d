//! Instrumentation macros and the [`ScopedComplete`] RAII guard.
//!
//! Grounded in `phosphor-internal.h`'s `PHOSPHOR_INTERNAL_TRACE_EVENT*`
//! macros and `scoped_event_guard.h`'s `ScopedEventGuard`: each call site
//! gets its own `static TracepointInfo` plus a `OnceLock`-cached pointer to
//! that category's `AtomicCategoryStatus`, so a disabled call costs one
//! `Acquire` load after the first hit.
//!
//! The two-argument, type-deduced generality of the original macros is out
//! of scope (spec.md's "dynamic schemas beyond 2 args" non-goal); these
//! take at most one pre-built [`crate::trace_argument::TraceArgument`].

/// Looks up (and caches) the category's enabled status, then logs an event
/// through the process-wide [`crate::trace_log::instance`] if enabled.
/// Not part of the public macro surface directly; used by the
/// `trace_*!` macros below.
#[doc(hidden)]
pub fn dispatch(
    tpi: &'static crate::tracepoint_info::TracepointInfo,
    cache: &'static std::sync::OnceLock<&'static crate::category_registry::AtomicCategoryStatus>,
    args: [crate::trace_argument::TraceArgument; crate::trace_event::ARG_COUNT],
) {
    let status = cache.get_or_init(|| {
        crate::trace_log::instance().category_status(tpi.category)
    });
    if status.is_enabled() {
        crate::trace_log::instance().log_event(tpi, args);
    }
}

/// Logs an `Instant` event, scoped to this thread.
#[macro_export]
macro_rules! trace_instant {
    ($category:expr, $name:expr) => {{
        static TPI: $crate::tracepoint_info::TracepointInfo =
            $crate::tracepoint_info::TracepointInfo::bare(
                $category,
                $name,
                $crate::tracepoint_info::TraceEventType::Instant,
            );
        static CACHE: ::std::sync::OnceLock<
            &'static $crate::category_registry::AtomicCategoryStatus,
        > = ::std::sync::OnceLock::new();
        $crate::macros::dispatch(
            &TPI,
            &CACHE,
            [
                $crate::trace_argument::TraceArgument::none(),
                $crate::trace_argument::TraceArgument::none(),
            ],
        )
    }};
}

/// Logs a `GlobalInstant` event, visible across all threads in a viewer.
#[macro_export]
macro_rules! trace_global_instant {
    ($category:expr, $name:expr) => {{
        static TPI: $crate::tracepoint_info::TracepointInfo =
            $crate::tracepoint_info::TracepointInfo::bare(
                $category,
                $name,
                $crate::tracepoint_info::TraceEventType::GlobalInstant,
            );
        static CACHE: ::std::sync::OnceLock<
            &'static $crate::category_registry::AtomicCategoryStatus,
        > = ::std::sync::OnceLock::new();
        $crate::macros::dispatch(
            &TPI,
            &CACHE,
            [
                $crate::trace_argument::TraceArgument::none(),
                $crate::trace_argument::TraceArgument::none(),
            ],
        )
    }};
}

/// Logs an `AsyncStart` event carrying `id` as its first argument (an
/// address-sized correlation token, matched later by `trace_async_end!`
/// with the same `id`).
#[macro_export]
macro_rules! trace_async_start {
    ($category:expr, $name:expr, $id:expr) => {{
        static TPI: $crate::tracepoint_info::TracepointInfo =
            $crate::tracepoint_info::TracepointInfo::bare(
                $category,
                $name,
                $crate::tracepoint_info::TraceEventType::AsyncStart,
            );
        static CACHE: ::std::sync::OnceLock<
            &'static $crate::category_registry::AtomicCategoryStatus,
        > = ::std::sync::OnceLock::new();
        $crate::macros::dispatch(
            &TPI,
            &CACHE,
            [
                $crate::trace_argument::TraceArgument::from_pointer($id),
                $crate::trace_argument::TraceArgument::none(),
            ],
        )
    }};
}

/// Logs the matching `AsyncEnd` event for `trace_async_start!`.
#[macro_export]
macro_rules! trace_async_end {
    ($category:expr, $name:expr, $id:expr) => {{
        static TPI: $crate::tracepoint_info::TracepointInfo =
            $crate::tracepoint_info::TracepointInfo::bare(
                $category,
                $name,
                $crate::tracepoint_info::TraceEventType::AsyncEnd,
            );
        static CACHE: ::std::sync::OnceLock<
            &'static $crate::category_registry::AtomicCategoryStatus,
        > = ::std::sync::OnceLock::new();
        $crate::macros::dispatch(
            &TPI,
            &CACHE,
            [
                $crate::trace_argument::TraceArgument::from_pointer($id),
                $crate::trace_argument::TraceArgument::none(),
            ],
        )
    }};
}

/// Logs a `SyncStart` event, paired with `trace_sync_end!` around a span
/// whose duration the viewer should nest under the enclosing thread track.
#[macro_export]
macro_rules! trace_sync_start {
    ($category:expr, $name:expr) => {{
        static TPI: $crate::tracepoint_info::TracepointInfo =
            $crate::tracepoint_info::TracepointInfo::bare(
                $category,
                $name,
                $crate::tracepoint_info::TraceEventType::SyncStart,
            );
        static CACHE: ::std::sync::OnceLock<
            &'static $crate::category_registry::AtomicCategoryStatus,
        > = ::std::sync::OnceLock::new();
        $crate::macros::dispatch(
            &TPI,
            &CACHE,
            [
                $crate::trace_argument::TraceArgument::none(),
                $crate::trace_argument::TraceArgument::none(),
            ],
        )
    }};
}

/// Logs the matching `SyncEnd` event for `trace_sync_start!`.
#[macro_export]
macro_rules! trace_sync_end {
    ($category:expr, $name:expr) => {{
        static TPI: $crate::tracepoint_info::TracepointInfo =
            $crate::tracepoint_info::TracepointInfo::bare(
                $category,
                $name,
                $crate::tracepoint_info::TraceEventType::SyncEnd,
            );
        static CACHE: ::std::sync::OnceLock<
            &'static $crate::category_registry::AtomicCategoryStatus,
        > = ::std::sync::OnceLock::new();
        $crate::macros::dispatch(
            &TPI,
            &CACHE,
            [
                $crate::trace_argument::TraceArgument::none(),
                $crate::trace_argument::TraceArgument::none(),
            ],
        )
    }};
}

/// RAII guard recording a `Complete` event spanning its own lifetime,
/// mirroring `ScopedEventGuard`. The category/enabled check happens once at
/// construction; a disabled guard records nothing and its `Drop` is a
/// single branch.
pub struct ScopedComplete {
    tpi: &'static crate::tracepoint_info::TracepointInfo,
    start_nanos: i64,
    args: [crate::trace_argument::TraceArgument; crate::trace_event::ARG_COUNT],
    enabled: bool,
}

impl ScopedComplete {
    #[doc(hidden)]
    pub fn new(
        tpi: &'static crate::tracepoint_info::TracepointInfo,
        status: &crate::category_registry::AtomicCategoryStatus,
        args: [crate::trace_argument::TraceArgument; crate::trace_event::ARG_COUNT],
    ) -> Self {
        let enabled = status.is_enabled();
        ScopedComplete {
            tpi,
            start_nanos: if enabled {
                crate::trace_event::TraceEvent::now_nanos()
            } else {
                0
            },
            args,
            enabled,
        }
    }
}

impl Drop for ScopedComplete {
    fn drop(&mut self) {
        if self.enabled {
            let duration = (crate::trace_event::TraceEvent::now_nanos() - self.start_nanos).max(0) as u64;
            crate::trace_log::instance().log_complete_event(self.tpi, self.start_nanos, duration, self.args);
        }
    }
}

/// Builds a [`ScopedComplete`] guard spanning the rest of the current
/// block.
#[macro_export]
macro_rules! trace_scoped_complete {
    ($category:expr, $name:expr) => {
        $crate::trace_scoped_complete!(@with_cache $category, $name)
    };
    (@with_cache $category:expr, $name:expr) => {{
        static TPI: $crate::tracepoint_info::TracepointInfo =
            $crate::tracepoint_info::TracepointInfo::bare(
                $category,
                $name,
                $crate::tracepoint_info::TraceEventType::Complete,
            );
        static CACHE: ::std::sync::OnceLock<
            &'static $crate::category_registry::AtomicCategoryStatus,
        > = ::std::sync::OnceLock::new();
        let status = CACHE.get_or_init(|| $crate::trace_log::instance().category_status($category));
        $crate::macros::ScopedComplete::new(
            &TPI,
            status,
            [
                $crate::trace_argument::TraceArgument::none(),
                $crate::trace_argument::TraceArgument::none(),
            ],
        )
    }};
}
