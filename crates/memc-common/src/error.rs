//! Error types for memc-load

use thiserror::Error;

/// Result type alias for loader operations
pub type Result<T> = std::result::Result<T, LoadError>;

/// Main error type for memc-load
///
/// Everything after startup is counted rather than propagated, so most
/// variants end up as an `errors += 1` and a log line.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bad line: {0:?}")]
    BadLine(String),

    #[error("Bad number {value:?}: {source}")]
    BadNumber {
        value: String,
        #[source]
        source: std::num::ParseFloatError,
    },

    #[error("Unknown device type: {0:?}")]
    UnknownDevice(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Malformed memcache key: {0:?}")]
    MalformedKey(String),

    #[error("Backend {addr}: {message}")]
    Backend { addr: String, message: String },

    #[error("Invalid file pattern {pattern:?}: {message}")]
    Pattern { pattern: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LoadError {
    /// Build a backend error for the server at `addr`
    pub fn backend(addr: impl Into<String>, message: impl std::fmt::Display) -> Self {
        LoadError::Backend {
            addr: addr.into(),
            message: message.to_string(),
        }
    }

    /// Short category name used in log fields
    pub fn category(&self) -> &'static str {
        match self {
            LoadError::Io(_) => "io",
            LoadError::BadLine(_) | LoadError::BadNumber { .. } => "parse",
            LoadError::UnknownDevice(_) => "unknown_device",
            LoadError::Encode(_) => "encode",
            LoadError::MalformedKey(_) | LoadError::Backend { .. } => "backend",
            LoadError::Pattern { .. } => "pattern",
            LoadError::Config(_) => "config",
        }
    }
}
