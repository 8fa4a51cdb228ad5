//! Error types for the sync engine.

use rescache_storage::StorageError;
use thiserror::Error;

/// Errors returned by the ledger HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Ledger returned an error response.
    #[error("node error: {status} - {message}")]
    NodeError {
        /// HTTP status code.
        status: u16,
        /// Error body returned by the ledger.
        message: String,
    },

    /// Failed to deserialize the response.
    #[error("invalid response format: {0}")]
    InvalidResponse(String),
}

/// Errors surfaced by the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The configured base URL is unusable.
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),

    /// Ledger API failure.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Store failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Live channel failure.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// `initialize` was already called.
    #[error("engine already initialized")]
    AlreadyInitialized,

    /// The engine has been closed.
    #[error("engine is closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(e.to_string())
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
