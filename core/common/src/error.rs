//! Common error types for the universal storage facade.

use thiserror::Error;

/// Top-level error type for storage operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No settings document could be discovered.
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    /// The settings document is unreadable, incomplete or fails validation.
    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// Resource not found within the storage.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Local I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend operation failed without an underlying I/O error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Operation is not allowed on this object.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether this error belongs to the I/O failure family (local or remote).
    pub fn is_io_failure(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Storage(_))
    }

    /// Whether this error is a configuration failure raised at startup.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::ConfigurationMissing(_) | Error::ConfigurationInvalid(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ConfigurationInvalid(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
