//! Error types for instrumentation setup
//!
//! Instrumented calls never fail because of instrumentation. The fallible
//! surfaces are configuration loading and member lookup on a dynamic
//! [`Class`](crate::installer::Class).

/// Errors raised while building or loading a trace configuration
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// Configuration text could not be parsed
    #[error("Config parse error: {message}")]
    ConfigParse {
        /// Parser diagnostic
        message: String,
    },

    /// Configuration parsed but holds a value that can never match anything
    #[error("Invalid config: {message}")]
    InvalidConfig {
        /// Error message describing the invalid field
        message: String,
    },

    /// No member with this name exists on the class
    #[error("{class} has no member `{member}`")]
    UnknownMember {
        /// Class name
        class: String,
        /// Requested member
        member: String,
    },

    /// The member exists but is a plain attribute
    #[error("{class}.{member} is not callable")]
    NotCallable {
        /// Class name
        class: String,
        /// Requested member
        member: String,
    },

    /// The class was registered without a constructor
    #[error("{class} has no constructor")]
    MissingConstructor {
        /// Class name
        class: String,
    },
}

impl TraceError {
    /// Create a config parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an unknown member error
    pub fn unknown_member(class: impl Into<String>, member: impl Into<String>) -> Self {
        Self::UnknownMember {
            class: class.into(),
            member: member.into(),
        }
    }

    /// Create a not-callable error
    pub fn not_callable(class: impl Into<String>, member: impl Into<String>) -> Self {
        Self::NotCallable {
            class: class.into(),
            member: member.into(),
        }
    }
}

/// Standard result type for configuration operations
pub type Result<T> = std::result::Result<T, TraceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TraceError::invalid_config("disabled method name is blank");
        assert_eq!(
            err.to_string(),
            "Invalid config: disabled method name is blank"
        );

        let err = TraceError::config_parse("expected `=`");
        assert!(err.to_string().starts_with("Config parse error"));

        let err = TraceError::not_callable("UserEntity", "_id");
        assert_eq!(err.to_string(), "UserEntity._id is not callable");
    }
}
