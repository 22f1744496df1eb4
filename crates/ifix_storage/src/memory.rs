//! In-memory storage backend for testing.

use crate::backend::KeyValueStore;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory key-value store.
///
/// This backend keeps all entries in a sorted map and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// An optional quota counts key and value bytes together, the way browser
/// local storage does, so storage-pressure paths can be exercised in tests.
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use ifix_storage::{KeyValueStore, InMemoryStore};
///
/// let store = InMemoryStore::new();
/// store.set("a", "1").unwrap();
/// assert_eq!(store.keys("").unwrap(), vec!["a".to_string()]);
/// assert_eq!(store.used_bytes().unwrap(), 2);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
    quota: Option<u64>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store without a quota.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new empty store that rejects writes beyond `bytes`.
    #[must_use]
    pub fn with_quota(bytes: u64) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            quota: Some(bytes),
        }
    }

    /// Creates a store with pre-existing entries.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            quota: None,
        }
    }

    /// Returns a copy of all entries.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn entries(&self) -> BTreeMap<String, String> {
        self.entries.read().clone()
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

fn entry_size(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.entries.write();

        if let Some(limit) = self.quota {
            let current: u64 = entries.iter().map(|(k, v)| entry_size(k, v)).sum();
            let replaced = entries.get(key).map_or(0, |old| entry_size(key, old));
            let requested = current - replaced + entry_size(key, value);
            if requested > limit {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    requested,
                    limit,
                });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .entries
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn used_bytes(&self) -> StorageResult<u64> {
        Ok(self
            .entries
            .read()
            .iter()
            .map(|(k, v)| entry_size(k, v))
            .sum())
    }

    fn quota(&self) -> Option<u64> {
        self.quota
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.used_bytes().unwrap(), 0);
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn memory_set_and_get() {
        let store = InMemoryStore::new();
        store.set("key", "value").unwrap();
        assert_eq!(store.get("key").unwrap().as_deref(), Some("value"));

        store.set("key", "other").unwrap();
        assert_eq!(store.get("key").unwrap().as_deref(), Some("other"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn memory_remove_reports_presence() {
        let store = InMemoryStore::new();
        store.set("key", "value").unwrap();

        assert!(store.remove("key").unwrap());
        assert!(!store.remove("key").unwrap());
        assert!(store.get("key").unwrap().is_none());
    }

    #[test]
    fn memory_keys_filters_by_prefix_in_order() {
        let store = InMemoryStore::new();
        store.set("IFIX_ORDERS", "{}").unwrap();
        store.set("IFIX_CUSTOMERS_backup_2", "{}").unwrap();
        store.set("IFIX_CUSTOMERS", "{}").unwrap();
        store.set("OTHER", "{}").unwrap();
        store.set("IFIX_CUSTOMERS_backup_1", "{}").unwrap();

        let keys = store.keys("IFIX_CUSTOMERS").unwrap();
        assert_eq!(
            keys,
            vec![
                "IFIX_CUSTOMERS",
                "IFIX_CUSTOMERS_backup_1",
                "IFIX_CUSTOMERS_backup_2"
            ]
        );
        assert_eq!(store.keys("").unwrap().len(), 5);
    }

    #[test]
    fn memory_quota_rejects_oversized_write() {
        let store = InMemoryStore::with_quota(10);
        store.set("k", "12345").unwrap();

        let result = store.set("j", "1234567890");
        assert!(matches!(
            result,
            Err(StorageError::QuotaExceeded { limit: 10, .. })
        ));
        // Previous value untouched
        assert_eq!(store.get("k").unwrap().as_deref(), Some("12345"));
        assert!(store.get("j").unwrap().is_none());
    }

    #[test]
    fn memory_quota_counts_replacement_not_addition() {
        let store = InMemoryStore::with_quota(10);
        store.set("k", "123456789").unwrap();
        // Replacing the same key only counts the new value
        store.set("k", "987654321").unwrap();
        assert_eq!(store.used_bytes().unwrap(), 10);
        assert_eq!(store.quota(), Some(10));
    }

    #[test]
    fn memory_with_entries() {
        let store = InMemoryStore::with_entries([("a", "1"), ("b", "2")]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.entries().get("b").map(String::as_str), Some("2"));
    }

    #[test]
    fn memory_clear() {
        let store = InMemoryStore::with_entries([("a", "1")]);
        store.clear();
        assert!(store.is_empty());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn quota_is_never_exceeded(
                writes in prop::collection::vec(("[a-c]{1,2}", "[x]{0,40}"), 1..30),
                quota in 10u64..200,
            ) {
                let store = InMemoryStore::with_quota(quota);
                for (key, value) in &writes {
                    let before = store.get(key).unwrap();
                    match store.set(key, value) {
                        Ok(()) => {
                            let stored = store.get(key).unwrap();
                            prop_assert_eq!(stored.as_deref(), Some(value.as_str()));
                        }
                        Err(e) => {
                            prop_assert!(e.is_quota_exceeded());
                            prop_assert_eq!(store.get(key).unwrap(), before);
                        }
                    }
                    prop_assert!(store.used_bytes().unwrap() <= quota);
                }
            }
        }
    }
}
