//! Directory-backed storage for persistent key-value data.

use crate::backend::KeyValueStore;
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Name of the advisory lock file.
const LOCK_FILE: &str = "LOCK";
/// Extension used for value files.
const VALUE_EXT: &str = "json";

/// A directory-backed key-value store.
///
/// Each key is stored as `<dir>/<key>.json`. Data survives process restarts.
///
/// # Durability
///
/// `set` writes to a temporary file, syncs it and renames it over the
/// previous value, so a crash leaves either the old or the new value.
///
/// # Locking
///
/// The store holds an exclusive advisory lock on `<dir>/LOCK` for its whole
/// lifetime; a second `open` on the same directory fails with
/// [`StorageError::Locked`]. The lock is released on drop.
///
/// # Example
///
/// ```no_run
/// use ifix_storage::{KeyValueStore, FileStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("ifix-data")).unwrap();
/// store.set("IFIX_CUSTOMERS", "[]").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    quota: Option<u64>,
    /// Serializes writers within this process.
    write_lock: RwLock<()>,
    _lock_file: File,
}

impl FileStore {
    /// Opens or creates a store rooted at `dir`, creating directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, or
    /// [`StorageError::Locked`] if another process holds it.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            quota: None,
            write_lock: RwLock::new(()),
            _lock_file: lock_file,
        })
    }

    /// Sets a byte quota enforced on every write.
    #[must_use]
    pub fn with_quota(mut self, bytes: u64) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// Returns the root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.{VALUE_EXT}")))
    }

    fn file_len(path: &Path) -> StorageResult<u64> {
        match fs::metadata(path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn stored_keys(&self) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(VALUE_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.path_for(key)?;
        let _guard = self.write_lock.read();
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let _guard = self.write_lock.write();

        if let Some(limit) = self.quota {
            let current = self.used_bytes_unlocked()?;
            let replaced = Self::file_len(&path)?;
            let requested = current - replaced.min(current) + value.len() as u64;
            if requested > limit {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    requested,
                    limit,
                });
            }
        }

        let tmp = path.with_extension(format!("{VALUE_EXT}.tmp"));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        let _guard = self.write_lock.write();
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let _guard = self.write_lock.read();
        Ok(self
            .stored_keys()?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }

    fn used_bytes(&self) -> StorageResult<u64> {
        let _guard = self.write_lock.read();
        self.used_bytes_unlocked()
    }

    fn quota(&self) -> Option<u64> {
        self.quota
    }
}

impl FileStore {
    fn used_bytes_unlocked(&self) -> StorageResult<u64> {
        let mut total = 0;
        for key in self.stored_keys()? {
            total += Self::file_len(&self.dir.join(format!("{key}.{VALUE_EXT}")))?;
        }
        Ok(total)
    }
}
