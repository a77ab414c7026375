//! Instrumentation configuration
//!
//! A [`TraceConfig`] is supplied once per class and never changes afterwards.
//! Every field is optional when loaded from TOML; the field names used by the
//! `#[trace]` attribute (`disable`, `perf`, `mem_watch`, `log_input`) are
//! accepted as aliases.

use crate::error::{Result, TraceError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Pre-call argument logging options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputLogging {
    /// Emit one `info` record per call describing the arguments
    pub enabled: bool,
    /// Pretty-print and syntax-highlight the record instead of one-line JSON
    pub beautify: bool,
}

impl Default for InputLogging {
    fn default() -> Self {
        Self {
            enabled: true,
            beautify: false,
        }
    }
}

/// Configuration applied to every method of one class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Method names that are never wrapped
    #[serde(alias = "disable")]
    pub disabled_methods: BTreeSet<String>,
    /// Measure and classify execution time
    #[serde(alias = "perf")]
    pub measure_time: bool,
    /// Measure and classify the resident memory delta
    #[serde(alias = "mem_watch")]
    pub measure_memory: bool,
    /// Pre-call argument logging
    #[serde(alias = "log_input")]
    pub input_logging: InputLogging,
}

impl TraceConfig {
    /// Create a configuration with all defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude a method from instrumentation
    pub fn disable(mut self, method: impl Into<String>) -> Self {
        self.disabled_methods.insert(method.into());
        self
    }

    /// Enable or disable execution-time measurement
    pub fn with_measure_time(mut self, enabled: bool) -> Self {
        self.measure_time = enabled;
        self
    }

    /// Enable or disable memory-delta measurement
    pub fn with_measure_memory(mut self, enabled: bool) -> Self {
        self.measure_memory = enabled;
        self
    }

    /// Configure pre-call argument logging
    pub fn with_input_logging(mut self, enabled: bool, beautify: bool) -> Self {
        self.input_logging = InputLogging { enabled, beautify };
        self
    }

    /// Whether `method` was explicitly opted out
    pub fn is_disabled(&self, method: &str) -> bool {
        self.disabled_methods.contains(method)
    }

    /// Whether any post-call measurement is active
    pub fn measures(&self) -> bool {
        self.measure_time || self.measure_memory
    }

    /// Reject values that would silently match nothing.
    ///
    /// Installation itself is fail-open and never calls this; loaders do.
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = self
            .disabled_methods
            .iter()
            .find(|name| name.trim().is_empty() || name.trim() != name.as_str())
        {
            return Err(TraceError::invalid_config(format!(
                "disabled method name `{name}` is blank or padded with whitespace"
            )));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| TraceError::config_parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
