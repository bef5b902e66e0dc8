//! Custom error types for the sync agent.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// A directory entry that is neither a file, a directory nor a symlink.
    /// Never recovered from.
    #[error("Inconsistent filesystem state: {0}")]
    InconsistentFilesystemState(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Cancelled")]
    Cancelled,

    /// A remote path that would resolve outside the local root.
    #[error("Unsafe path from remote: {0}")]
    UnsafePath(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SyncError {
    /// Map an I/O error on `path` to the taxonomy, keeping permission and
    /// missing-file failures distinguishable from generic I/O errors.
    pub fn from_io(err: std::io::Error, path: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => SyncError::AccessDenied(path.to_string()),
            std::io::ErrorKind::NotFound => SyncError::NotFound(path.to_string()),
            _ => SyncError::Io(err),
        }
    }

    /// Errors worth another attempt after a backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::NetworkFailure(_) => true,
            SyncError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
