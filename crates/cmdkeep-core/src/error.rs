//! Error types for cmdkeep-core

use thiserror::Error;

use crate::sync::TransportError;

/// Result type alias using cmdkeep-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cmdkeep-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Command not found
    #[error("Command not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote store request failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Malformed or schema-invalid sync payload
    #[error("Invalid sync payload: {0}")]
    Format(String),

    /// The user aborted a file dialog or the conflict resolution flow.
    ///
    /// Not a failure: nothing was written when this is returned.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this error represents a user cancellation rather than a failure.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
