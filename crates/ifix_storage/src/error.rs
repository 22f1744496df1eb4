//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The backend refused a write because it would exceed its quota.
    #[error("storage quota exceeded writing {key}: {requested} bytes requested, limit {limit}")]
    QuotaExceeded {
        /// The key being written.
        key: String,
        /// Total bytes the store would hold after the write.
        requested: u64,
        /// The configured limit.
        limit: u64,
    },

    /// The key contains characters the backend cannot represent.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// Another process holds the storage lock.
    #[error("storage locked: another process has exclusive access")]
    Locked,
}

impl StorageError {
    /// Returns `true` if this error is a quota rejection.
    #[must_use]
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}
