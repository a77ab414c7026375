//! Per-call records and threshold classification
//!
//! All three record types live for one log emission and are never stored.

use crate::layer::LayerTag;
use crate::serialize::{render_beautified, render_plain};
use crate::sink::Severity;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Execution time below this is `Info`
pub const TIME_WARN_MILLIS: f64 = 10.0;
/// Execution time at or above this is `Error`
pub const TIME_ERROR_MILLIS: f64 = 20.0;
/// Memory delta below this is `Info`
pub const MEMORY_WARN_MB: i64 = 5;
/// Memory delta at or above this is `Error`
pub const MEMORY_ERROR_MB: i64 = 10;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One invocation as seen by the pre-call log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord<'a> {
    /// Layer of the owning class
    pub layer: LayerTag,
    /// `<ClassName>.<methodName>`
    pub path: &'a str,
    /// Arguments in call order, already rendered cycle-safe
    pub args: Vec<Value>,
}

impl CallRecord<'_> {
    /// Render as one-line JSON, or pretty highlighted JSON when `beautify`
    pub fn render(&self, beautify: bool) -> String {
        if beautify {
            render_beautified(self)
        } else {
            render_plain(self)
        }
    }
}

/// Elapsed wall time of one call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceSample {
    /// Milliseconds, floored at the hundredths digit
    pub elapsed_millis: f64,
}

impl PerformanceSample {
    /// Build from a measured duration
    pub fn from_elapsed(elapsed: Duration) -> Self {
        // Integer hundredths keep 9.99ms from flooring to 9.98.
        let hundredths = elapsed.as_nanos() / 10_000;
        Self {
            elapsed_millis: hundredths as f64 / 100.0,
        }
    }

    /// `<10ms` info, `[10, 20)ms` warn, `>=20ms` error
    pub fn severity(&self) -> Severity {
        if self.elapsed_millis < TIME_WARN_MILLIS {
            Severity::Info
        } else if self.elapsed_millis < TIME_ERROR_MILLIS {
            Severity::Warn
        } else {
            Severity::Error
        }
    }

    /// Log line for this sample
    pub fn message(&self, layer: LayerTag, path: &str) -> String {
        format!(
            "{layer}:Performance:{}: {path} Execution time: {} milliseconds",
            self.severity().label(),
            self.elapsed_millis
        )
    }
}

/// Resident memory growth across one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    /// Whole megabytes, rounded half up; negative when memory was released
    pub delta_mb: i64,
}

impl MemorySample {
    /// Build from two RSS readings in bytes
    pub fn from_readings(start_bytes: u64, end_bytes: u64) -> Self {
        let delta = i128::from(end_bytes) - i128::from(start_bytes);
        Self {
            delta_mb: bytes_to_mb(delta),
        }
    }

    /// `<5MB` info, `[5, 10)MB` warn, `>=10MB` error
    pub fn severity(&self) -> Severity {
        if self.delta_mb < MEMORY_WARN_MB {
            Severity::Info
        } else if self.delta_mb < MEMORY_ERROR_MB {
            Severity::Warn
        } else {
            Severity::Error
        }
    }

    /// Log line for this sample
    pub fn message(&self, layer: LayerTag, path: &str) -> String {
        format!(
            "{layer}:Performance:{}: {path} Consumed memory: {} MB",
            self.severity().label(),
            self.delta_mb
        )
    }
}

/// Convert a byte delta to whole megabytes, rounding half toward +inf
pub fn bytes_to_mb(bytes: i128) -> i64 {
    (bytes as f64 / BYTES_PER_MB + 0.5).floor() as i64
}
