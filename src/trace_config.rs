//! `TraceConfig` (per-trace settings) and `TraceLogConfig` (process-wide,
//! environment-derived settings read once at `TraceLog` construction).

use std::sync::Arc;

use crate::error::{PhosphorError, Result};
use crate::string_utils::{join_string, split_string};
use crate::trace_buffer::{BufferMode, FixedTraceBuffer, RingTraceBuffer, TraceBuffer};
use crate::trace_context::TraceContext;

pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024 * 1024;

/// Builds a `TraceBuffer` for a given generation/size; `custom` mode
/// configs carry their own factory rather than one of the two built-ins.
pub type BufferFactory = Arc<dyn Fn(usize, usize) -> Box<dyn TraceBuffer> + Send + Sync>;

/// Invoked when a trace stops, with the finished trace's buffer and thread
/// names. `TraceLog` extracts the `TraceContext` itself before dispatching
/// (its internal lock is not reentrant, so the callback cannot call back
/// into the log to fetch it, unlike the reference implementation's
/// lock-guard-passing `getTraceContext(lh)` overload).
pub trait TracingStoppedCallback: Send + Sync {
    fn on_stop(&self, context: &TraceContext);
}

pub type StopCallback = Arc<dyn TracingStoppedCallback>;

fn factory_for_mode(mode: BufferMode) -> Result<BufferFactory> {
    match mode {
        BufferMode::Fixed => Ok(Arc::new(|generation, chunk_count| {
            Box::new(FixedTraceBuffer::new(generation, chunk_count)) as Box<dyn TraceBuffer>
        })),
        BufferMode::Ring => Ok(Arc::new(|generation, chunk_count| {
            Box::new(RingTraceBuffer::new(generation, chunk_count)) as Box<dyn TraceBuffer>
        })),
        BufferMode::Custom => Err(PhosphorError::InvalidArgument(
            "cannot get a built-in factory for custom buffer mode".to_string(),
        )),
    }
}

/// Per-trace-session configuration: which buffer, how big, which
/// categories, and what happens on stop.
#[derive(Clone)]
pub struct TraceConfig {
    buffer_mode: BufferMode,
    buffer_size: usize,
    buffer_factory: BufferFactory,
    enabled_categories: Vec<String>,
    disabled_categories: Vec<String>,
    stopped_callback: Option<StopCallback>,
    stop_tracing_on_destruct: bool,
}

impl TraceConfig {
    pub fn new(buffer_mode: BufferMode, buffer_size: usize) -> Result<Self> {
        let buffer_factory = factory_for_mode(buffer_mode)?;
        Ok(TraceConfig {
            buffer_mode,
            buffer_size,
            buffer_factory,
            enabled_categories: vec!["*".to_string()],
            disabled_categories: Vec::new(),
            stopped_callback: None,
            stop_tracing_on_destruct: false,
        })
    }

    pub fn with_custom_factory(buffer_factory: BufferFactory, buffer_size: usize) -> Self {
        TraceConfig {
            buffer_mode: BufferMode::Custom,
            buffer_size,
            buffer_factory,
            enabled_categories: vec!["*".to_string()],
            disabled_categories: Vec::new(),
            stopped_callback: None,
            stop_tracing_on_destruct: false,
        }
    }

    pub fn buffer_mode(&self) -> BufferMode {
        self.buffer_mode
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn buffer_factory(&self) -> &BufferFactory {
        &self.buffer_factory
    }

    pub fn enabled_categories(&self) -> &[String] {
        &self.enabled_categories
    }

    pub fn disabled_categories(&self) -> &[String] {
        &self.disabled_categories
    }

    pub fn set_categories(&mut self, enabled: Vec<String>, disabled: Vec<String>) -> &mut Self {
        self.enabled_categories = enabled;
        self.disabled_categories = disabled;
        self
    }

    pub fn stopped_callback(&self) -> Option<&StopCallback> {
        self.stopped_callback.as_ref()
    }

    pub fn set_stopped_callback(&mut self, cb: StopCallback) -> &mut Self {
        self.stopped_callback = Some(cb);
        self
    }

    pub fn stop_tracing_on_destruct(&self) -> bool {
        self.stop_tracing_on_destruct
    }

    pub fn set_stop_tracing_on_destruct(&mut self, v: bool) -> &mut Self {
        self.stop_tracing_on_destruct = v;
        self
    }

    /// Parses the semicolon-separated `key:value` config string grammar.
    pub fn from_string(config: &str) -> Result<Self> {
        let mut mode = BufferMode::Fixed;
        let mut buffer_size: i64 = DEFAULT_BUFFER_SIZE as i64;
        let mut filename = String::new();
        let mut enabled_categories = "*".to_string();
        let mut disabled_categories = String::new();

        for argument in split_string(config, ';') {
            if argument.is_empty() {
                continue;
            }
            let kv = split_string(&argument, ':');
            if kv.len() < 2 {
                return Err(PhosphorError::InvalidArgument(format!(
                    "malformed config entry '{argument}'"
                )));
            }
            let key = kv[0].as_str();
            let value = kv[1].as_str();

            match key {
                "buffer-mode" => {
                    mode = value.parse()?;
                }
                "buffer-size" => {
                    buffer_size = value.parse::<i64>().map_err(|_| {
                        PhosphorError::InvalidArgument(
                            "buffer-size was not a valid integer".to_string(),
                        )
                    })?;
                    if buffer_size < 0 {
                        return Err(PhosphorError::InvalidArgument(
                            "buffer-size cannot be negative".to_string(),
                        ));
                    }
                }
                "save-on-stop" => filename = value.to_string(),
                "enabled-categories" => enabled_categories = value.to_string(),
                "disabled-categories" => disabled_categories = value.to_string(),
                _ => {}
            }
        }

        let mut config_obj = TraceConfig::new(mode, buffer_size as usize)?;
        if !filename.is_empty() {
            let cb: StopCallback = Arc::new(crate::export::FileStopCallback::new(filename));
            config_obj.set_stopped_callback(cb);
            config_obj.set_stop_tracing_on_destruct(true);
        }
        config_obj.set_categories(
            split_string(&enabled_categories, ','),
            split_string(&disabled_categories, ','),
        );
        Ok(config_obj)
    }

    /// Renders back to the config string grammar. The stop callback is not
    /// round-trippable; `from_string(cfg.to_string())` preserves everything
    /// else.
    pub fn to_config_string(&self) -> String {
        format!(
            "buffer-mode:{};buffer-size:{};enabled-categories:{};disabled-categories:{}",
            self.buffer_mode,
            self.buffer_size,
            join_string(&self.enabled_categories, ','),
            join_string(&self.disabled_categories, ','),
        )
    }
}

/// Process-wide settings read once from the environment, separate from the
/// per-session `TraceConfig`.
pub struct TraceLogConfig {
    /// Vestigial: retained for parity with `PHOSPHOR_SENTINEL_COUNT`, but
    /// this crate's tri-state `ChunkLock` design has no sentinel pool to
    /// size. Only consumed by tests/benchmarks wanting a historical knob.
    pub sentinel_count: u32,
    pub startup_trace: Option<TraceConfig>,
}

impl TraceLogConfig {
    pub fn new() -> Self {
        TraceLogConfig {
            sentinel_count: std::thread::available_parallelism()
                .map(|n| n.get() as u32 * 4)
                .unwrap_or(4),
            startup_trace: None,
        }
    }

    pub fn from_env() -> Result<Self> {
        let mut config = TraceLogConfig::new();

        if let Ok(raw) = std::env::var("PHOSPHOR_SENTINEL_COUNT") {
            if !raw.is_empty() {
                let parsed: i64 = raw.parse().map_err(|_| {
                    PhosphorError::InvalidArgument(
                        "PHOSPHOR_SENTINEL_COUNT was not a valid integer".to_string(),
                    )
                })?;
                if parsed < 0 {
                    return Err(PhosphorError::InvalidArgument(
                        "PHOSPHOR_SENTINEL_COUNT cannot be negative".to_string(),
                    ));
                }
                config.sentinel_count = parsed as u32;
            }
        }

        if let Ok(raw) = std::env::var("PHOSPHOR_TRACING_START") {
            if !raw.is_empty() {
                config.startup_trace = Some(TraceConfig::from_string(&raw)?);
            }
        }

        Ok(config)
    }
}

impl Default for TraceLogConfig {
    fn default() -> Self {
        Self::new()
    }
}
