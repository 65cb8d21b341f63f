//! Error types for the engine binary.
//!
//! Only startup can fail: the config file, the content bundle and the
//! recorded track. Everything after startup degrades and logs instead.

use std::path::PathBuf;

/// Top-level startup error.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: crate::config::ConfigError,
    },

    /// The content bundle could not be read or parsed.
    #[error("content bundle {path}: {message}")]
    Bundle {
        /// Bundle file.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// The recorded position track could not be read or parsed.
    #[error("track {path}: {message}")]
    Track {
        /// Track file.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },
}
