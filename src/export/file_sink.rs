//! File-sink stop callback: exports the finished trace to a path built
//! from a template with `%p` (PID) / `%d` (UTC timestamp) substitution.

use std::io::Write;

use crate::error::PhosphorError;
use crate::string_utils::string_replace;
use crate::trace_config::TracingStoppedCallback;
use crate::trace_context::TraceContext;

use super::JsonExport;

pub struct FileStopCallback {
    path_template: String,
}

impl FileStopCallback {
    pub fn new(path_template: impl Into<String>) -> Self {
        FileStopCallback {
            path_template: path_template.into(),
        }
    }

    /// Substitutes the first `%p` with the current PID and the first `%d`
    /// with a `YYYY.MM.DDTHH.MM.SSZ` UTC timestamp.
    pub fn generate_file_path(&self) -> String {
        let mut target = self.path_template.clone();
        string_replace(&mut target, "%p", &crate::platform::current_process_id().to_string());
        string_replace(&mut target, "%d", &utc_timestamp());
        target
    }

    fn write(&self, context: &TraceContext) -> Result<(), PhosphorError> {
        let path = self.generate_file_path();
        let json = JsonExport::new(context).to_string();
        let mut file = std::fs::File::create(&path).map_err(|source| PhosphorError::Io {
            context: format!("opening trace output file '{path}'"),
            source,
        })?;
        file.write_all(json.as_bytes())
            .map_err(|source| PhosphorError::Io {
                context: format!("writing trace output file '{path}'"),
                source,
            })
    }
}

impl TracingStoppedCallback for FileStopCallback {
    fn on_stop(&self, context: &TraceContext) {
        if let Err(err) = self.write(context) {
            log::error!("phosphor: failed to export trace on stop: {err}");
        }
    }
}

/// `YYYY.MM.DDTHH.MM.SSZ`, computed from `SystemTime` without pulling in a
/// date/time crate (Howard Hinnant's civil-from-days algorithm).
fn utc_timestamp() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let total_secs = now.as_secs() as i64;
    let days = total_secs.div_euclid(86_400);
    let secs_of_day = total_secs.rem_euclid(86_400);

    let (year, month, day) = civil_from_days(days);
    let hour = secs_of_day / 3600;
    let minute = (secs_of_day % 3600) / 60;
    let second = secs_of_day % 60;

    format!(
        "{:04}.{:02}.{:02}T{:02}.{:02}.{:02}Z",
        year, month, day, hour, minute, second
    )
}

fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_file_path_substitutes_pid_once() {
        let cb = FileStopCallback::new("trace-%p-%p.json");
        let path = cb.generate_file_path();
        let pid = crate::platform::current_process_id().to_string();
        assert_eq!(path, format!("trace-{pid}-%p.json"));
    }

    #[test]
    fn generate_file_path_substitutes_timestamp() {
        let cb = FileStopCallback::new("trace-%d.json");
        let path = cb.generate_file_path();
        assert!(path.starts_with("trace-"));
        assert!(path.contains('T'));
        assert!(path.ends_with("Z.json"));
    }

    #[test]
    fn civil_from_days_matches_known_epoch() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
    }
}
