//! Procedural macros for `layer-trace`
//!
//! Use through the re-export `layer_trace::trace`; the expansion refers to
//! `::layer_trace` paths.

use proc_macro::TokenStream;

mod expand;
mod options;

/// Instrument every method of an `impl` block.
///
/// Each method with a `self` receiver gets a pre-call argument record and,
/// when enabled, execution-time and memory-delta records after it returns.
/// Associated functions without a receiver (constructors), `const fn`s,
/// associated constants and types are left as written.
///
/// # Options
///
/// - `disable = ["name", ...]` - methods to leave untouched
/// - `perf` / `perf = <bool>` - measure execution time
/// - `mem_watch` / `mem_watch = <bool>` - measure resident memory delta
/// - `log_input(enabled = <bool>, beautify = <bool>)` or `log_input = <bool>`
/// - `sink = path::to::function` - `fn() -> Arc<dyn LogSink>` used instead of
///   the default `tracing` sink
///
/// Unknown options are compile errors.
///
/// # Failed calls
///
/// The post-call records are skipped when the method panics or returns
/// `Err(_)`. Every other return value, including `None`, counts as success.
///
/// # Async methods
///
/// An `async fn` is measured inside its future. The argument record is
/// emitted at the first poll, not when the method is called, and time is
/// measured until the future completes. A future dropped before its first poll
/// logs nothing, and one dropped after it logs only the argument record.
///
/// # Trait impls
///
/// The original bodies are moved into hidden inherent methods, so on a trait
/// impl the self type must be local to the crate.
///
/// # Example
///
/// ```ignore
/// use layer_trace::trace;
///
/// struct UserResolver;
///
/// #[trace(perf, log_input(beautify = true), disable = ["health"])]
/// impl UserResolver {
///     fn new() -> Self {
///         UserResolver
///     }
///
///     fn get_user(&self, id: &str) -> Option<String> {
///         Some(id.to_string())
///     }
///
///     fn health(&self) -> bool {
///         true
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn trace(attr: TokenStream, item: TokenStream) -> TokenStream {
    match expand::expand(attr.into(), item.into()) {
        Ok(output) => output.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
