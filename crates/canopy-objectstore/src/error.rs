//! Error types for the canopy-objectstore crate

use thiserror::Error;

/// Result type alias using `ObjectStoreError`
pub type Result<T> = std::result::Result<T, ObjectStoreError>;

/// Errors that can occur during object storage operations
#[derive(Error, Debug)]
pub enum ObjectStoreError {
    /// Object not found
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Bucket not found
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    /// Bucket could not be created
    #[error("failed to create bucket {bucket}: {reason}")]
    BucketCreation { bucket: String, reason: String },

    /// Request to the storage backend failed
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ObjectStoreError {
    /// Create a backend error from any displayable error
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }

    /// Whether the error means the object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::BucketNotFound(_))
    }
}
