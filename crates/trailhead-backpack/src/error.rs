//! Error types for the backpack data layer.
//!
//! These errors never reach the player. The store logs them and falls back
//! to the last known good local state; they exist so each layer can say
//! precisely what went wrong in its logs and tests.

/// Errors from client-side persistent storage.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be serialized for storage.
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the remote backpack API.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The request could not be sent or no response arrived.
    #[error("remote request failed: {0}")]
    Request(String),

    /// The server answered with a non-success status.
    #[error("remote returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("remote response malformed: {0}")]
    Decode(String),

    /// The remote is unreachable (offline stand-in).
    #[error("remote unreachable")]
    Unreachable,
}
