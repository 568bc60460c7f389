//! Error types for Meridian.

use thiserror::Error;

/// Top-level error type for Meridian operations.
#[derive(Debug, Error)]
pub enum MeridianError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration loading and merging errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration text could not be parsed
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// An override had the wrong value type for its field
    #[error("invalid value for {section}.{key}: expected {expected}")]
    InvalidValue {
        /// Section the key belongs to
        section: String,
        /// Offending key
        key: String,
        /// Expected value type
        expected: &'static str,
    },

    /// A top-level override entry was not a table
    #[error("section {0} must be a table")]
    NotATable(String),
}

/// Fault raised by an event handler or scheduled callback.
///
/// Faults are caught where the handler is invoked, logged, and never stop the
/// remaining dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerFault(String);

impl HandlerFault {
    /// Creates a fault with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Returns the fault message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<&str> for HandlerFault {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for HandlerFault {
    fn from(message: String) -> Self {
        Self(message)
    }
}

/// Result type alias for Meridian operations.
pub type MeridianResult<T> = Result<T, MeridianError>;
