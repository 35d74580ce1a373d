//! Stand-ins for the platform-specific thread/process-ID acquisition that
//! spec.md names as an external collaborator out of this core's scope.
//!
//! Events are stamped with a small `u32` thread ID rather than the OS's
//! native (and platform-varying) thread identifier type, so that
//! `TraceChunk`/`TraceEvent` stay platform independent; this module is the
//! only place that bridges the two.

use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_THREAD_ID: AtomicU32 = AtomicU32::new(1);

thread_local! {
    static CACHED_THREAD_ID: u32 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Returns a small, process-unique, stable-per-thread identifier.
///
/// Cheap to call repeatedly: the value is computed once per thread and
/// cached in thread-local storage thereafter.
pub fn current_thread_id() -> u32 {
    CACHED_THREAD_ID.with(|id| *id)
}

/// Returns the current process ID.
pub fn current_process_id() -> u32 {
    std::process::id()
}
