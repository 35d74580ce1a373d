//! Static, program-lifetime metadata describing one instrumentation site.
//! A `TracepointInfo` is constructed once (typically as a `static`) and
//! shared by reference from every `TraceEvent` it produces; it is never
//! copied into the hot-path event record.

use crate::trace_argument::TraceArgumentType;

/// The phase an event represents, per the Chrome Trace Event format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEventType {
    AsyncStart,
    AsyncEnd,
    SyncStart,
    SyncEnd,
    Instant,
    GlobalInstant,
    Complete,
}

#[derive(Debug)]
pub struct TracepointInfo {
    pub category: &'static str,
    pub name: &'static str,
    pub event_type: TraceEventType,
    pub arg_names: [&'static str; 2],
    pub arg_types: [TraceArgumentType; 2],
}

impl TracepointInfo {
    pub const fn new(
        category: &'static str,
        name: &'static str,
        event_type: TraceEventType,
        arg_names: [&'static str; 2],
        arg_types: [TraceArgumentType; 2],
    ) -> Self {
        TracepointInfo {
            category,
            name,
            event_type,
            arg_names,
            arg_types,
        }
    }

    /// Convenience constructor for sites with no arguments.
    pub const fn bare(category: &'static str, name: &'static str, event_type: TraceEventType) -> Self {
        Self::new(
            category,
            name,
            event_type,
            ["", ""],
            [TraceArgumentType::None, TraceArgumentType::None],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_constructor_defaults_args_to_none() {
        static TPI: TracepointInfo = TracepointInfo::bare("cat", "name", TraceEventType::Instant);
        assert_eq!(TPI.arg_types, [TraceArgumentType::None, TraceArgumentType::None]);
    }
}
