//! Integration tests for the six concrete scenarios.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use phosphor_trace::trace_config::TracingStoppedCallback;
use phosphor_trace::{BufferMode, TraceArgument, TraceConfig, TraceContext, TraceLog};
use phosphor_trace::tracepoint_info::{TraceEventType, TracepointInfo};

static TPI: TracepointInfo = TracepointInfo::bare("test", "ev", TraceEventType::Instant);

fn args_none() -> [TraceArgument; phosphor_trace::trace_event::ARG_COUNT] {
    [TraceArgument::none(), TraceArgument::none()]
}

struct CountingCallback(Arc<AtomicUsize>);

impl TracingStoppedCallback for CountingCallback {
    fn on_stop(&self, _context: &TraceContext) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scenario 1: fixed-mode saturation stops tracing automatically, exactly
/// `CHUNK_CAPACITY` events survive, and the stop callback fires once.
#[test]
fn fixed_mode_saturation_autostops_and_calls_back_once() {
    let _ = env_logger::try_init();
    let log = TraceLog::new();
    log.register_thread("producer").unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let mut config =
        TraceConfig::new(BufferMode::Fixed, std::mem::size_of::<phosphor_trace::TraceChunk>())
            .unwrap();
    config.set_stopped_callback(Arc::new(CountingCallback(calls.clone())));
    log.start(config).unwrap();

    for _ in 0..(phosphor_trace::trace_buffer::CHUNK_CAPACITY + 200) {
        log.log_event(&TPI, args_none());
    }

    assert!(!log.is_enabled());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Scenario 2: ring-mode perpetual write never disables tracing and keeps
/// roughly buffer-sized data after stop.
#[test]
fn ring_mode_perpetual_write_keeps_tracing_enabled() {
    let log = Arc::new(TraceLog::new());
    let chunk_bytes = std::mem::size_of::<phosphor_trace::TraceChunk>();
    log.start(TraceConfig::new(BufferMode::Ring, 4 * chunk_bytes).unwrap())
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let log = log.clone();
            thread::spawn(move || {
                log.register_thread(format!("writer-{i}")).unwrap();
                for _ in 0..20_000 {
                    log.log_event(&TPI, args_none());
                }
                log.deregister_thread().unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert!(log.is_enabled());
    log.stop();

    let ctx = log.get_trace_context().unwrap();
    let chunk_count = ctx.buffer().map(|b| b.chunks().len()).unwrap_or(0);
    assert!(chunk_count >= 3 && chunk_count <= 4, "chunk_count={chunk_count}");
}

/// Scenario 3: the tricky mixed-group glob semantics from spec.md §8.3.
#[test]
fn glob_filtering_pins_mixed_group_semantics() {
    let log = TraceLog::new();
    let mut config = TraceConfig::new(BufferMode::Fixed, 4096 * 4).unwrap();
    config.set_categories(
        vec!["memcached:*".to_string()],
        vec!["memcached:cmd_set".to_string()],
    );
    log.start(config).unwrap();

    assert!(log.category_status("memcached:cmd_get").is_enabled());
    assert!(!log.category_status("memcached:cmd_set").is_enabled());
    assert!(!log
        .category_status("memcached:cmd_set,kv:mutation")
        .is_enabled());
}

/// Scenario 4: stopping while producers are still appending must not panic,
/// deadlock, or leave the log unreadable afterwards.
#[test]
fn concurrent_stop_vs_append_leaves_a_readable_buffer() {
    let log = Arc::new(TraceLog::new());
    log.start(TraceConfig::new(BufferMode::Ring, 16 * std::mem::size_of::<phosphor_trace::TraceChunk>()).unwrap())
        .unwrap();

    let stop_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let log = log.clone();
            let stop_flag = stop_flag.clone();
            thread::spawn(move || {
                log.register_thread(format!("writer-{i}")).unwrap();
                while !stop_flag.load(Ordering::Relaxed) {
                    log.log_event(&TPI, args_none());
                }
                let _ = log.deregister_thread();
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(100));
    log.stop();
    stop_flag.store(true, Ordering::Relaxed);
    for h in handles {
        h.join().unwrap();
    }

    let ctx = log.get_trace_context().unwrap();
    assert!(ctx.buffer().is_some());
}

/// Scenario 5: a Complete event's exported JSON matches the documented
/// shape exactly, through the full `TraceLog` -> `JsonExport` path.
#[test]
fn complete_event_export_matches_documented_shape() {
    static COMPLETE_TPI: TracepointInfo =
        TracepointInfo::bare("cat", "n", TraceEventType::Complete);

    let log = TraceLog::new();
    log.register_thread("t").unwrap();
    log.start(TraceConfig::new(BufferMode::Fixed, 4096 * 4).unwrap())
        .unwrap();
    log.log_complete_event(&COMPLETE_TPI, 2002, 3033, args_none());
    log.stop();

    let ctx = log.get_trace_context().unwrap();
    let json = phosphor_trace::JsonExport::new(&ctx).to_string();
    assert!(json.contains(
        "{\"name\":\"n\",\"cat\":\"cat\",\"ph\":\"X\",\"dur\":3.033,\"ts\":2.002,\"pid\":"
    ));
    assert!(json.contains("\"args\":{}"));
}

/// Scenario 6: registry overflow onto the sentinel is stable regardless of
/// an enable-everything policy.
#[test]
fn registry_overflow_sentinel_ignores_enable_all_policy() {
    let log = TraceLog::new();
    let mut config = TraceConfig::new(BufferMode::Fixed, 4096 * 4).unwrap();
    config.set_categories(vec!["*".to_string()], vec![]);
    log.start(config).unwrap();

    let available = phosphor_trace::category_registry::REGISTRY_SIZE - 3;
    for i in 0..available {
        log.category_status(&format!("group-{i}"));
    }
    let overflow = log.category_status("group-overflow") as *const _;
    let sentinel = log.category_status("category limit reached") as *const _;
    assert_eq!(overflow, sentinel);
    assert!(!log.category_status("group-overflow").is_enabled());
}
