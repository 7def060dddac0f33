//! Error types for memo-core

use thiserror::Error;

/// Result type alias using memo-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in memo-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// A write was attempted without a signed-in identity
    #[error("Sign-in required for this operation")]
    AuthenticationRequired,

    /// Remote store call failed (transport, backend or storage)
    #[error("Network failure: {0}")]
    Network(String),

    /// Malformed import payload or other rejected document
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Note or category not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error came from the remote store.
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}
