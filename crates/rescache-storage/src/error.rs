//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store was used before `connect` or after `close`.
    #[error("store is not connected")]
    NotConnected,

    /// A block could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A corruption was detected.
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// The backing database reported an error.
    #[error("backend error: {0}")]
    Backend(String),
}

/// A specialized Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
