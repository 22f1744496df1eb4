//! Error types for the record store.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in record store operations.
///
/// Read paths recover locally and rarely surface these; write paths
/// propagate them so callers can report the failure.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] ifix_storage::StorageError),

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The referenced record does not exist.
    #[error("record {id} not found in table {table}")]
    NotFound {
        /// Table searched.
        table: String,
        /// The missing id.
        id: String,
    },

    /// A record violates the table's required-field policy or an entity rule.
    #[error("validation failed for table {table}: {message}")]
    Validation {
        /// Table the record was destined for.
        table: String,
        /// Description of the violation.
        message: String,
    },

    /// An import or backup payload could not be parsed.
    #[error("invalid format: {message}")]
    Format {
        /// Description of the format issue.
        message: String,
    },

    /// The backend rejected a write even after compaction and eviction.
    #[error("storage quota exceeded for table {table}: {requested} bytes requested, limit {limit}")]
    StorageQuota {
        /// Table being written.
        table: String,
        /// Total bytes the backend would have held.
        requested: u64,
        /// The backend limit.
        limit: u64,
    },

    /// An optimistic update found a different `_version` than expected.
    #[error("version conflict on {id}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Record id.
        id: String,
        /// Version the caller based its change on.
        expected: u64,
        /// Version currently stored.
        actual: u64,
    },

    /// A status change is not allowed by the entity workflow.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// No backup exists under the requested key.
    #[error("backup not found: {key}")]
    BackupNotFound {
        /// The requested key, or a description when none was given.
        key: String,
    },

    /// The table name cannot be used as a storage key.
    #[error("invalid table name: {name:?}")]
    InvalidTableName {
        /// The rejected name.
        name: String,
    },
}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.into(),
            id: id.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates a format error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Creates a backup not found error.
    pub fn backup_not_found(key: impl Into<String>) -> Self {
        Self::BackupNotFound { key: key.into() }
    }

    /// Creates an invalid transition error.
    pub fn invalid_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Returns `true` for errors caused by the caller's input rather than storage.
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Validation { .. }
                | Self::Format { .. }
                | Self::VersionConflict { .. }
                | Self::InvalidTransition { .. }
                | Self::BackupNotFound { .. }
                | Self::InvalidTableName { .. }
        )
    }
}
