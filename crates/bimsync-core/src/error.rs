//! Error types for bimsync-core

use thiserror::Error;

/// Result type alias using bimsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in bimsync-core operations
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

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A remote synchronizer call failed
    #[error("Remote error: {0}")]
    Remote(String),

    /// A tuple or link that cannot be reconciled
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The synchronization run was cancelled
    #[error("Synchronization cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this error is a cancellation signal rather than a failure.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
