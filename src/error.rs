//! Error types for backup and storage operations.

use thiserror::Error;

/// Result type for backup operations.
pub type BackupResult<T> = Result<T, BackupError>;

/// Errors that can occur while backing up a site.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The storage API rejected a request. 409 responses that are not
    /// path-not-found end up here (e.g. folder-create conflicts).
    #[error("storage API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A path that does not exist remotely. Expected during existence
    /// checks; converted to `Option`/bool at the metadata seam.
    #[error("remote path not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("upload of {path} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        path: String,
        attempts: u32,
        last_error: String,
    },

    #[error("folder enumeration failed: {0}")]
    Enumeration(String),

    #[error("content hash mismatch for {path}: local {local}, remote {remote}")]
    HashMismatch {
        path: String,
        local: String,
        remote: String,
    },

    #[error("notification delivery failed: {0}")]
    Notification(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("archive creation failed: {0}")]
    Archive(String),

    #[error("database dump failed: {0}")]
    Dump(String),

    #[error("authentication failed: {0}")]
    Auth(String),
}

impl BackupError {
    /// True for the not-found case an existence check is allowed to swallow.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackupError::NotFound(_))
    }
}
