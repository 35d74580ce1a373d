//! `TraceEvent` — the single-cache-line record appended to a `TraceChunk`
//! on every instrumentation call.

use std::time::Instant;

use crate::string_utils::to_json_string;
use crate::trace_argument::{TraceArgument, TraceArgumentType};
use crate::tracepoint_info::{TraceEventType, TracepointInfo};

pub const ARG_COUNT: usize = 2;

/// One occurrence of a tracepoint. Exactly one cache line: `tpi` (8 bytes),
/// `args` (2x8), `time` (8), `duration` (8) = 40 bytes, comfortably under
/// the 64-byte budget with room for the arguments array's union alignment.
#[derive(Clone, Copy)]
pub struct TraceEvent {
    tpi: &'static TracepointInfo,
    args: [TraceArgument; ARG_COUNT],
    time: i64,
    duration: u64,
}

const _: () = assert!(std::mem::size_of::<TraceEvent>() <= 64);

/// Reference point for `time`/`duration`: nanoseconds since an arbitrary
/// process-local origin, matching `steady_clock`'s lack of a defined epoch.
/// Captured once, lazily, the first time a timestamp is needed.
fn steady_origin() -> Instant {
    static ORIGIN: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    *ORIGIN.get_or_init(Instant::now)
}

fn steady_now_nanos() -> i64 {
    steady_origin().elapsed().as_nanos() as i64
}

impl TraceEvent {
    /// Constructs a non-`Complete` event, stamping the current steady-clock
    /// time.
    pub fn new(tpi: &'static TracepointInfo, args: [TraceArgument; ARG_COUNT]) -> Self {
        TraceEvent {
            tpi,
            args,
            time: steady_now_nanos(),
            duration: 0,
        }
    }

    /// Constructs a `Complete` event spanning `[start, start + duration)`,
    /// as measured by a scoped guard around a block of user code.
    pub fn new_complete(
        tpi: &'static TracepointInfo,
        start_nanos: i64,
        duration_nanos: u64,
        args: [TraceArgument; ARG_COUNT],
    ) -> Self {
        TraceEvent {
            tpi,
            args,
            time: start_nanos,
            duration: duration_nanos,
        }
    }

    /// The steady-clock nanosecond timestamp appropriate for a
    /// newly-constructed event, exposed so `ScopedComplete` can capture a
    /// matching start time.
    pub fn now_nanos() -> i64 {
        steady_now_nanos()
    }

    pub fn category(&self) -> &'static str {
        self.tpi.category
    }

    pub fn name(&self) -> &'static str {
        self.tpi.name
    }

    pub fn event_type(&self) -> TraceEventType {
        self.tpi.event_type
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    /// Renders this event as one Chrome Trace Event JSON object.
    pub fn to_json(&self, thread_id: u32, pid: u32) -> String {
        let mut out = String::with_capacity(160);
        out.push_str("{\"name\":");
        out.push_str(&to_json_string(self.tpi.name));
        out.push_str(",\"cat\":");
        out.push_str(&to_json_string(self.tpi.category));

        let (phase, extras) = self.phase_and_extras();
        out.push_str(",\"ph\":\"");
        out.push_str(phase);
        out.push('"');
        out.push_str(&extras);

        let (time_us, time_ns) = lldiv(self.time, 1000);
        out.push_str(&format!(",\"ts\":{}.{:03}", time_us, time_ns));
        out.push_str(&format!(",\"pid\":{}", pid));
        out.push_str(&format!(",\"tid\":{}", thread_id));

        out.push_str(",\"args\":{");
        for i in 0..ARG_COUNT {
            let ty = self.tpi.arg_types[i];
            if ty == TraceArgumentType::None {
                break;
            }
            if i != 0 {
                out.push(',');
            }
            out.push_str(&to_json_string(self.tpi.arg_names[i]));
            out.push(':');
            out.push_str(&self.args[i].to_json_value(ty));
        }
        out.push('}');

        out.push('}');
        out
    }

    fn phase_and_extras(&self) -> (&'static str, String) {
        match self.tpi.event_type {
            TraceEventType::AsyncStart => ("b", format!(",\"id\":{}", self.args[0].to_json_value(TraceArgumentType::Pointer))),
            TraceEventType::AsyncEnd => ("e", format!(",\"id\":{}", self.args[0].to_json_value(TraceArgumentType::Pointer))),
            TraceEventType::SyncStart => ("B", String::new()),
            TraceEventType::SyncEnd => ("E", String::new()),
            TraceEventType::Instant => ("i", ",\"s\":\"t\"".to_string()),
            TraceEventType::GlobalInstant => ("i", ",\"s\":\"g\"".to_string()),
            TraceEventType::Complete => {
                let (dur_us, dur_ns) = lldiv(self.duration as i64, 1000);
                ("X", format!(",\"dur\":{}.{:03}", dur_us, dur_ns))
            }
        }
    }
}

/// Splits `value` into `(quotient, remainder)` the way C's `lldiv` does,
/// used to render nanosecond counts as microseconds with a 3-digit
/// fractional (nanosecond) part.
fn lldiv(value: i64, divisor: i64) -> (i64, i64) {
    (value / divisor, value % divisor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracepoint_info::TracepointInfo;

    static INSTANT_TPI: TracepointInfo =
        TracepointInfo::bare("cat", "n", TraceEventType::Instant);

    static COMPLETE_TPI: TracepointInfo =
        TracepointInfo::bare("cat", "n", TraceEventType::Complete);

    #[test]
    fn size_is_within_one_cache_line() {
        assert!(std::mem::size_of::<TraceEvent>() <= 64);
    }

    #[test]
    fn complete_event_matches_expected_shape() {
        let event = TraceEvent::new_complete(
            &COMPLETE_TPI,
            2002,
            3033,
            [TraceArgument::none(), TraceArgument::none()],
        );
        let json = event.to_json(7, 99);
        assert_eq!(
            json,
            "{\"name\":\"n\",\"cat\":\"cat\",\"ph\":\"X\",\"dur\":3.033,\"ts\":2.002,\"pid\":99,\"tid\":7,\"args\":{}}"
        );
    }

    #[test]
    fn instant_event_carries_scope_field() {
        let event = TraceEvent::new(&INSTANT_TPI, [TraceArgument::none(), TraceArgument::none()]);
        assert!(event.to_json(1, 1).contains("\"s\":\"t\""));
    }

    #[test]
    fn lldiv_splits_like_c_lldiv() {
        assert_eq!(lldiv(2002, 1000), (2, 2));
        assert_eq!(lldiv(3033, 1000), (3, 33));
    }
}
