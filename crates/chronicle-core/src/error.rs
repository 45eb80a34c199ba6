//! Error types shared across the Chronicle components.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while working with the domain model.
#[derive(Error, Debug)]
pub enum Error {
    /// A message group was empty where at least one message is required.
    #[error("empty message group")]
    EmptyGroup,

    /// A stored timestamp could not be interpreted as a UTC datetime.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    /// A field carried a value outside its expected format.
    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        /// The name of the invalid field.
        field: &'static str,
        /// Description of what's wrong.
        reason: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
