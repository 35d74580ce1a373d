//! In-process, high-frequency, low-overhead event tracing that renders to
//! Chrome Trace Event JSON — closely modeled on Couchbase's Phosphor C++
//! library.
//!
//! The fast path ([`TraceLog::log_event`]) never allocates, never blocks on
//! a contended lock, and never reports failure: a disabled category, an
//! exhausted fixed buffer, or an in-flight eviction all just drop the
//! event. Everything else — starting/stopping a trace, registering
//! threads, exporting — goes through ordinary fallible APIs.

pub mod category_registry;
pub mod chunk_lock;
pub mod chunk_tenant;
pub mod error;
pub mod export;
pub mod macros;
pub mod platform;
pub mod stats;
pub mod string_utils;
pub mod trace_argument;
pub mod trace_buffer;
pub mod trace_config;
pub mod trace_context;
pub mod trace_event;
pub mod trace_log;
pub mod tracepoint_info;

pub use category_registry::{AtomicCategoryStatus, CategoryStatus};
pub use error::{PhosphorError, Result};
pub use export::{FileStopCallback, JsonExport};
pub use macros::ScopedComplete;
pub use stats::{StatValue, StatsCallback, StatsMap};
pub use trace_argument::{TraceArgument, TraceArgumentType};
pub use trace_buffer::{BufferMode, FixedTraceBuffer, RingTraceBuffer, TraceBuffer, TraceChunk};
pub use trace_config::{TraceConfig, TraceLogConfig};
pub use trace_context::TraceContext;
pub use trace_event::TraceEvent;
pub use trace_log::{TraceLog, instance as trace_log_instance};
pub use tracepoint_info::{TraceEventType, TracepointInfo};
