//! Error types for the ingestion daemon.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during ingestion.
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Domain model error.
    #[error(transparent)]
    Core(#[from] chronicle_core::Error),

    /// Platform client error (network hiccup, deleted message, etc.).
    #[error("client error: {0}")]
    Client(String),

    /// A configured channel could not be resolved at startup.
    #[error("channel '{reference}' could not be resolved: {reason}")]
    ChannelResolution {
        /// The configured channel reference (handle or numeric id).
        reference: String,
        /// Description of what went wrong.
        reason: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_display() {
        let err = Error::Client("timed out".to_string());
        let msg = err.to_string();
        assert!(msg.contains("client error"));
        assert!(msg.contains("timed out"));
    }

    #[test]
    fn test_channel_resolution_display() {
        let err = Error::ChannelResolution {
            reference: "durov".to_string(),
            reason: "no such channel".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("durov"));
        assert!(msg.contains("no such channel"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }
}
