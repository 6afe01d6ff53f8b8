//! Error types for dbcx

use thiserror::Error;

/// Core error type shared by every dbcx crate
#[derive(Error, Debug)]
pub enum DbcxError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported dialect: {0}")]
    UnsupportedDialect(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl DbcxError {
    /// Invalid or missing connection setup. Raised synchronously and never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DbcxError::Configuration(_) | DbcxError::UnsupportedDialect(_) | DbcxError::NotFound(_)
        )
    }

    /// Failures reaching or authenticating against a backend.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            DbcxError::Connection(_) | DbcxError::NotConnected(_) | DbcxError::Driver(_)
        )
    }
}

/// Result type alias for dbcx operations
pub type Result<T> = std::result::Result<T, DbcxError>;
