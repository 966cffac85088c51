//! Error types for fhirsync-core

use std::sync::Arc;

use thiserror::Error;

/// Result type alias using fhirsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fhirsync-core operations
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

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No stored resource with this type and id
    #[error("Resource not found: {resource_type}/{id}")]
    ResourceNotFound { resource_type: String, id: String },

    /// Illegal transition in the local change log (e.g. update after delete)
    #[error("Invalid local change: {0}")]
    InvalidLocalChange(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON patch could not be computed or applied
    #[error("Patch error: {0}")]
    Patch(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The server answered with a non-informational OperationOutcome
    #[error("Server returned OperationOutcome: {0}")]
    Outcome(String),

    /// The server answered but did not confirm an upload
    #[error("Upload rejected: {0}")]
    Upload(String),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The sync pass was cancelled
    #[error("Sync cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::ResourceNotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }
}

/// Failure to upload or download a single resource (or the batch it was in).
///
/// These are collected during a sync pass instead of aborting it, so callers
/// can report or retry per resource type.
#[derive(Error, Debug, Clone)]
#[error("Failed to sync {resource_type}: {source}")]
pub struct ResourceSyncError {
    pub resource_type: String,
    #[source]
    pub source: Arc<Error>,
}

impl ResourceSyncError {
    pub fn new(resource_type: impl Into<String>, source: Error) -> Self {
        Self {
            resource_type: resource_type.into(),
            source: Arc::new(source),
        }
    }

    /// Attribute one shared failure (e.g. a rejected bundle) to a resource type.
    pub fn shared(resource_type: impl Into<String>, source: Arc<Error>) -> Self {
        Self {
            resource_type: resource_type.into(),
            source,
        }
    }
}
