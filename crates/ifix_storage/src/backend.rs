//! Storage port trait definition.

use crate::error::StorageResult;

/// A synchronous key-value store holding serialized values.
///
/// This is the only persistence primitive the record store relies on. Each
/// table lives under one key; backups live under derived keys sharing the
/// table key as prefix.
///
/// # Invariants
///
/// - `get` returns exactly the value last passed to `set` for that key
/// - `keys` returns every stored key starting with `prefix`, in ascending order
/// - A failed `set` leaves the previous value in place
/// - Implementations must be `Send + Sync`; mutation goes through `&self`
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::QuotaExceeded`] if the write would push
    /// the backend over its limit, or an I/O error.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes `key`. Returns `true` if a value was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be modified.
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Lists all keys starting with `prefix`, sorted ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be enumerated.
    fn keys(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Returns the number of bytes currently held by the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn used_bytes(&self) -> StorageResult<u64>;

    /// Returns the backend's write quota in bytes, if it enforces one.
    fn quota(&self) -> Option<u64> {
        None
    }
}
