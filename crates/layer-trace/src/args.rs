//! Argument capture for the `#[trace]` attribute
//!
//! Generated code needs one `Value` per argument whatever the argument's type.
//! Method resolution on `(&&ArgProbe(&arg)).trace_value()` picks the first
//! applicable impl in this order:
//!
//! 1. `T: Serialize` rendered through [`safe_to_value`]
//! 2. `T: Debug` rendered as its `{:?}` string
//! 3. anything else rendered as `"[<type name>]"`
//!
//! The three traits must all be in scope at the call site; [`capture_arg!`]
//! takes care of that.
//!
//! [`capture_arg!`]: crate::capture_arg

use crate::serialize::safe_to_value;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;

/// Borrowed argument awaiting capture
pub struct ArgProbe<'a, T: ?Sized>(pub &'a T);

/// Capture through `Serialize`
pub trait CaptureSerialize {
    /// Render the probed argument
    fn trace_value(&self) -> Value;
}

/// Capture through `Debug`
pub trait CaptureDebug {
    /// Render the probed argument
    fn trace_value(&self) -> Value;
}

/// Capture of an argument with neither `Serialize` nor `Debug`
pub trait CaptureOpaque {
    /// Render the probed argument
    fn trace_value(&self) -> Value;
}

impl<T: Serialize + ?Sized> CaptureSerialize for &&ArgProbe<'_, T> {
    fn trace_value(&self) -> Value {
        safe_to_value(self.0)
    }
}

impl<T: Debug + ?Sized> CaptureDebug for &ArgProbe<'_, T> {
    fn trace_value(&self) -> Value {
        Value::String(format!("{:?}", self.0))
    }
}

impl<T: ?Sized> CaptureOpaque for ArgProbe<'_, T> {
    fn trace_value(&self) -> Value {
        Value::String(format!("[{}]", std::any::type_name::<T>()))
    }
}

/// Capture one argument as a `serde_json::Value`, preferring `Serialize`,
/// then `Debug`, then the type name.
#[macro_export]
macro_rules! capture_arg {
    ($arg:expr) => {{
        #[allow(unused_imports)]
        use $crate::__private::{CaptureDebug as _, CaptureOpaque as _, CaptureSerialize as _};
        (&&&$crate::__private::ArgProbe(&$arg)).trace_value()
    }};
}
