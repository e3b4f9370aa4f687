//! Error types for scriptgate-state

use thiserror::Error;

/// Errors that can occur in the project persistence layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Requested record does not exist
    #[error("not found: {what}")]
    NotFound { what: String },

    /// Project root is missing its source URL or owner
    #[error("invalid project root: {0}")]
    InvalidRoot(String),

    /// Digest string is not 64-char hex
    #[error("invalid digest: {digest}")]
    InvalidDigest { digest: String },

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
