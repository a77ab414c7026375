//! Log sinks
//!
//! The wrapper only appends messages; it never configures or reads a sink.
//! [`TracingSink`] forwards to `tracing` and is the process-wide default.
//! [`MemorySink`] captures entries for assertions.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Severity of an emitted record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Informational
    Info,
    /// Threshold crossed, worth a look
    Warn,
    /// Threshold crossed, needs attention
    Error,
}

impl Severity {
    /// Label used inside performance messages
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Warn => "Warning",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Append-only destination for instrumentation records.
///
/// Implementations must not fail silently: a sink that cannot write should
/// panic, and the panic reaches the instrumented caller unchanged.
pub trait LogSink: Send + Sync {
    /// Log an info message
    fn info(&self, message: &str);

    /// Log a warning message
    fn warn(&self, message: &str);

    /// Log an error message
    fn error(&self, message: &str);

    /// Dispatch by severity
    fn emit(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => self.info(message),
            Severity::Warn => self.warn(message),
            Severity::Error => self.error(message),
        }
    }
}

impl<T: LogSink + ?Sized> LogSink for Arc<T> {
    fn info(&self, message: &str) {
        (**self).info(message);
    }

    fn warn(&self, message: &str) {
        (**self).warn(message);
    }

    fn error(&self, message: &str) {
        (**self).error(message);
    }
}

/// Sink forwarding to the `tracing` macros under the `layer_trace` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn info(&self, message: &str) {
        tracing::info!(target: "layer_trace", "{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "layer_trace", "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "layer_trace", "{}", message);
    }
}

static DEFAULT_SINK: Lazy<Arc<dyn LogSink>> = Lazy::new(|| Arc::new(TracingSink));

/// Process-wide default sink, shared by every tracer that is not given one
pub fn default_sink() -> Arc<dyn LogSink> {
    Arc::clone(&DEFAULT_SINK)
}

/// Sink that keeps every entry in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<(Severity, String)>>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured entries in emission order
    pub fn entries(&self) -> Vec<(Severity, String)> {
        self.entries.lock().clone()
    }

    /// Captured messages of one severity
    pub fn messages_with(&self, severity: Severity) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|(s, _)| *s == severity)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Number of captured entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing was captured
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop all captured entries
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn push(&self, severity: Severity, message: &str) {
        self.entries.lock().push((severity, message.to_string()));
    }
}

impl LogSink for MemorySink {
    fn info(&self, message: &str) {
        self.push(Severity::Info, message);
    }

    fn warn(&self, message: &str) {
        self.push(Severity::Warn, message);
    }

    fn error(&self, message: &str) {
        self.push(Severity::Error, message);
    }
}
