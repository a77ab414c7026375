//! # layer-trace
//!
//! Class-level call instrumentation: argument logging, execution-time and
//! memory-delta monitoring with fixed severity thresholds.
//!
//! Two ways to instrument a type:
//!
//! - [`trace`]: attribute for an `impl` block, rewriting each method with a
//!   receiver at compile time.
//! - [`install`]: wraps the methods of a dynamically built [`Class`].
//!
//! ```ignore
//! use layer_trace::trace;
//!
//! struct OrderService;
//!
//! #[trace(perf, mem_watch)]
//! impl OrderService {
//!     fn place(&self, id: &str) -> String {
//!         id.to_string()
//!     }
//! }
//! ```

pub mod args;
pub mod config;
pub mod error;
pub mod installer;
pub mod layer;
pub mod logging;
pub mod probe;
pub mod record;
pub mod serialize;
pub mod sink;
pub mod tracer;

pub use config::{InputLogging, TraceConfig};
pub use error::{Result, TraceError};
pub use installer::{install, Class, InstallReport, Member, Method, SkipReason};
pub use layer::LayerTag;
pub use layer_trace_macros::trace;
pub use probe::{Clock, MemoryProbe, MonotonicClock, ProcessMemoryProbe};
pub use record::{CallRecord, MemorySample, PerformanceSample};
pub use serialize::{
    safe_to_value, CIRCULAR_MARKER, MAX_CONTAINERS, MAX_DEPTH, UNSERIALIZABLE_MARKER,
};
pub use sink::{default_sink, LogSink, MemorySink, Severity, TracingSink};
pub use tracer::{CallGuard, Tracer, TracerBuilder};

/// Items referenced by `#[trace]` expansions. Not public API.
#[doc(hidden)]
pub mod __private {
    pub use crate::args::{ArgProbe, CaptureDebug, CaptureOpaque, CaptureSerialize};
    pub use crate::tracer::{FailedOutcome, Outcome, PlainOutcome};
    pub use once_cell::sync::Lazy;
    pub use serde_json::Value;
}
