//! Per-class tracer and the per-call wrapper
//!
//! A [`Tracer`] is built once per class: it fixes the class name, the inferred
//! [`LayerTag`], the configuration and the collaborators (sink, clock, memory
//! probe). Each call goes through [`Tracer::enter`], which performs the
//! pre-call steps and returns a [`CallGuard`]. The post-call steps run only when
//! the guard is explicitly completed after the call returned.
//!
//! # Invariants
//! - The result of the wrapped call is never altered; it is only classified as
//!   failed (`Err`) or not.
//! - A panic in the wrapped call unwinds through the guard without any
//!   post-call record. So does an unfinished future that is dropped.
//! - With input logging disabled, argument capture never runs.

use crate::config::TraceConfig;
use crate::layer::LayerTag;
use crate::probe::{Clock, MemoryProbe, MonotonicClock, ProcessMemoryProbe};
use crate::record::{CallRecord, MemorySample, PerformanceSample};
use crate::sink::{default_sink, LogSink};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

static DEFAULT_CLOCK: Lazy<Arc<dyn Clock>> = Lazy::new(|| Arc::new(MonotonicClock::new()));

static DEFAULT_MEMORY_PROBE: Lazy<Arc<dyn MemoryProbe>> =
    Lazy::new(|| Arc::new(ProcessMemoryProbe::new()));

/// Instrumentation state shared by every wrapped method of one class
#[derive(Clone)]
pub struct Tracer {
    class_name: String,
    layer: LayerTag,
    config: TraceConfig,
    sink: Arc<dyn LogSink>,
    clock: Arc<dyn Clock>,
    memory: Arc<dyn MemoryProbe>,
}

impl Tracer {
    /// Tracer for `class_name` using the process-wide sink, clock and probe
    pub fn new(class_name: impl Into<String>, config: TraceConfig) -> Self {
        TracerBuilder::new(class_name, config).build()
    }

    /// Start building a tracer with custom collaborators
    pub fn builder(class_name: impl Into<String>, config: TraceConfig) -> TracerBuilder {
        TracerBuilder::new(class_name, config)
    }

    /// Name of the instrumented class
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Layer inferred from the class name
    pub fn layer(&self) -> LayerTag {
        self.layer
    }

    /// Configuration this tracer was installed with
    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// `<ClassName>.<method>`
    pub fn path(&self, method: &str) -> String {
        format!("{}.{}", self.class_name, method)
    }

    /// Run the pre-call steps for `method`.
    ///
    /// `args` is only invoked when input logging is enabled. Call
    /// [`CallGuard::complete`] on the returned guard once the call returns.
    pub fn enter<F>(&self, method: &str, args: F) -> CallGuard<'_>
    where
        F: FnOnce() -> Vec<Value>,
    {
        let logging = self.config.input_logging;
        let needs_path = logging.enabled || self.config.measures();
        let path = if needs_path {
            self.path(method)
        } else {
            String::new()
        };

        if logging.enabled {
            let record = CallRecord {
                layer: self.layer,
                path: &path,
                args: args(),
            };
            self.sink.info(&record.render(logging.beautify));
        }

        let start_memory = self
            .config
            .measure_memory
            .then(|| self.memory.resident_bytes());
        let start_time = self.config.measure_time.then(|| self.clock.now());

        CallGuard {
            tracer: self,
            path,
            start_time,
            start_memory,
        }
    }

    /// Run `f` as an instrumented call of `method`
    pub fn call<T, A, F>(&self, method: &str, args: A, f: F) -> T
    where
        A: FnOnce() -> Vec<Value>,
        F: FnOnce() -> T,
    {
        let guard = self.enter(method, args);
        let result = f();
        guard.complete();
        result
    }

    /// Run a fallible `f`; an `Err` propagates unchanged and skips the
    /// post-call measurements, like a panic does.
    pub fn try_call<T, E, A, F>(&self, method: &str, args: A, f: F) -> Result<T, E>
    where
        A: FnOnce() -> Vec<Value>,
        F: FnOnce() -> Result<T, E>,
    {
        let guard = self.enter(method, args);
        match f() {
            Ok(value) => {
                guard.complete();
                Ok(value)
            }
            Err(err) => {
                guard.abandon();
                Err(err)
            }
        }
    }

    fn finish(&self, path: &str, start_time: Option<Duration>, start_memory: Option<u64>) {
        if let Some(start) = start_time {
            let elapsed = self.clock.now().saturating_sub(start);
            let sample = PerformanceSample::from_elapsed(elapsed);
            self.sink
                .emit(sample.severity(), &sample.message(self.layer, path));
        }

        if let Some(start) = start_memory {
            let sample = MemorySample::from_readings(start, self.memory.resident_bytes());
            self.sink
                .emit(sample.severity(), &sample.message(self.layer, path));
        }
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("class_name", &self.class_name)
            .field("layer", &self.layer)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Tracer`]
pub struct TracerBuilder {
    class_name: String,
    config: TraceConfig,
    sink: Option<Arc<dyn LogSink>>,
    clock: Option<Arc<dyn Clock>>,
    memory: Option<Arc<dyn MemoryProbe>>,
}

impl TracerBuilder {
    /// Create a builder for `class_name`
    pub fn new(class_name: impl Into<String>, config: TraceConfig) -> Self {
        Self {
            class_name: class_name.into(),
            config,
            sink: None,
            clock: None,
            memory: None,
        }
    }

    /// Send records to `sink` instead of the process-wide default
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Measure time with `clock`
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Measure memory with `probe`
    pub fn with_memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.memory = Some(probe);
        self
    }

    /// Finish the tracer; the layer tag is inferred here, once
    pub fn build(self) -> Tracer {
        let layer = LayerTag::infer(&self.class_name);
        tracing::debug!(
            class = %self.class_name,
            layer = %layer,
            measure_time = self.config.measure_time,
            measure_memory = self.config.measure_memory,
            "Tracer built"
        );
        Tracer {
            class_name: self.class_name,
            layer,
            config: self.config,
            sink: self.sink.unwrap_or_else(default_sink),
            clock: self.clock.unwrap_or_else(|| Arc::clone(&DEFAULT_CLOCK)),
            memory: self
                .memory
                .unwrap_or_else(|| Arc::clone(&DEFAULT_MEMORY_PROBE)),
        }
    }
}

/// Live instrumented call.
///
/// Post-call records are emitted by [`CallGuard::complete`] only. A guard that
/// is dropped any other way (unwinding, a cancelled future, [`abandon`])
/// emits nothing.
///
/// [`abandon`]: CallGuard::abandon
#[must_use = "a guard that is never completed emits no post-call records"]
pub struct CallGuard<'a> {
    tracer: &'a Tracer,
    path: String,
    start_time: Option<Duration>,
    start_memory: Option<u64>,
}

impl CallGuard<'_> {
    /// End a call that returned normally, emitting the post-call records
    pub fn complete(self) {
        self.tracer
            .finish(&self.path, self.start_time, self.start_memory);
    }

    /// End the call without post-call records, as for a failed call
    pub fn abandon(self) {}

    /// [`complete`](Self::complete) unless `failed`, else [`abandon`](Self::abandon)
    pub fn settle(self, failed: bool) {
        if failed {
            self.abandon();
        } else {
            self.complete();
        }
    }

    /// `<ClassName>.<method>`, empty when nothing is logged or measured
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Borrowed return value of an instrumented call, classified by
/// [`is_failure!`](crate::is_failure)
#[doc(hidden)]
pub struct Outcome<'a, T: ?Sized>(pub &'a T);

/// Picked for `Result` returns: an `Err` is a failed call
#[doc(hidden)]
pub trait FailedOutcome {
    /// Whether the call failed
    fn is_failure(&self) -> bool;
}

impl<T, E> FailedOutcome for &Outcome<'_, Result<T, E>> {
    fn is_failure(&self) -> bool {
        self.0.is_err()
    }
}

/// Fallback for every other return type: the call returned, so it succeeded
#[doc(hidden)]
pub trait PlainOutcome {
    /// Always `false`
    fn is_failure(&self) -> bool;
}

impl<T: ?Sized> PlainOutcome for Outcome<'_, T> {
    fn is_failure(&self) -> bool {
        false
    }
}

/// Whether a returned value counts as a failed call: `true` only for an `Err`.
#[doc(hidden)]
#[macro_export]
macro_rules! is_failure {
    ($result:expr) => {{
        #[allow(unused_imports)]
        use $crate::__private::{FailedOutcome as _, PlainOutcome as _};
        (&&$crate::__private::Outcome(&$result)).is_failure()
    }};
}
