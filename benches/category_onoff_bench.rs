//! Overhead of the `trace_instant!` macro with its category enabled vs.
//! disabled (global tracing on either way), mirroring
//! `tests/benchmark/category_onoff_bench.cc`'s `CategoryOnOffBench::Macro`.
//!
//! Both cases share the process-wide `TraceLog` (as the macros always do),
//! reconfigured between benchmark functions via `start()`'s "stop-then-
//! restart" behavior.

use criterion::{Criterion, criterion_group, criterion_main};
use phosphor_trace::{BufferMode, TraceConfig};

fn category_enabled(c: &mut Criterion) {
    let log = phosphor_trace::trace_log_instance();
    let _ = log.register_thread("bench-enabled");
    let mut config = TraceConfig::new(BufferMode::Ring, 1024 * 1024).unwrap();
    config.set_categories(vec!["*".to_string()], vec![]);
    log.start(config).unwrap();

    c.bench_function("category_enabled_macro", |b| {
        b.iter(|| {
            phosphor_trace::trace_instant!("cat_1", "name");
        })
    });

    log.stop();
}

fn category_disabled(c: &mut Criterion) {
    let log = phosphor_trace::trace_log_instance();
    let _ = log.register_thread("bench-disabled");
    let mut config = TraceConfig::new(BufferMode::Ring, 1024 * 1024).unwrap();
    config.set_categories(vec!["*".to_string()], vec!["cat_1".to_string()]);
    log.start(config).unwrap();

    c.bench_function("category_disabled_macro", |b| {
        b.iter(|| {
            phosphor_trace::trace_instant!("cat_1", "name");
        })
    });

    log.stop();
}

criterion_group!(benches, category_enabled, category_disabled);
criterion_main!(benches);
