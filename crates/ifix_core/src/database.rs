//! Database: the entry point owning storage, configuration and table locks.

use crate::backup;
use crate::config::Config;
use crate::entities::{CatalogStore, CustomerStore, OrderStore};
use crate::error::{CoreError, CoreResult};
use crate::events::{EventFeed, StoreEvent};
use crate::stats::{MetricsSnapshot, StoreMetrics};
use crate::store::{RecordStore, VerifyReport};
use crate::table::TableSchema;
use ifix_storage::{FileStore, InMemoryStore, KeyValueStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::{debug, info};

/// State shared by every table handle of one database.
pub(crate) struct Shared {
    pub(crate) storage: Arc<dyn KeyValueStore>,
    pub(crate) config: Config,
    pub(crate) feed: EventFeed,
    pub(crate) metrics: StoreMetrics,
}

/// An open record database.
///
/// A `Database` is a set of named tables stored in one key-value backend.
/// Tables are created on first access.
///
/// # Example
///
/// ```rust,ignore
/// use ifix_core::{Config, Database};
///
/// let db = Database::open_with_config(Path::new("./ifix_data"), Config::default())?;
/// let orders = db.orders()?;
/// println!("{} orders", orders.store().count());
/// ```
pub struct Database {
    shared: Arc<Shared>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.shared.config)
            .field("tables", &self.locks.lock().len())
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Opens a file-backed database in `dir` with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be opened or is locked by
    /// another process.
    pub fn open(dir: &Path) -> CoreResult<Self> {
        Self::open_with_config(dir, Config::default())
    }

    /// Opens a file-backed database in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be opened or is locked by
    /// another process.
    pub fn open_with_config(dir: &Path, config: Config) -> CoreResult<Self> {
        let storage = FileStore::open(dir)?;
        info!(dir = %dir.display(), prefix = %config.key_prefix, "database opened");
        Ok(Self::with_storage(Arc::new(storage), config))
    }

    /// Creates a database over an existing backend.
    #[must_use]
    pub fn with_storage(storage: Arc<dyn KeyValueStore>, config: Config) -> Self {
        Self {
            shared: Arc::new(Shared {
                storage,
                config,
                feed: EventFeed::new(),
                metrics: StoreMetrics::new(),
            }),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Creates an empty in-memory database with the default configuration.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_storage(Arc::new(InMemoryStore::new()), Config::default())
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Returns the storage backend.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.shared.storage
    }

    /// Subscribes to the events of every table.
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        self.shared.feed.subscribe()
    }

    /// Returns the operation counters accumulated since the database opened.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Opens the table `name`, creating it if it does not exist.
    ///
    /// Generated ids are prefixed with the lowercased table name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTableName` for names that cannot be used as keys, or a
    /// storage error if the table cannot be initialized.
    pub fn table(&self, name: &str) -> CoreResult<RecordStore> {
        self.open_table(name, None)
    }

    /// Opens the table `name` and enforces `schema` on create.
    ///
    /// The schema is also recorded in the table's metadata.
    ///
    /// # Errors
    ///
    /// Same as [`Self::table`].
    pub fn table_with_schema(&self, name: &str, schema: TableSchema) -> CoreResult<RecordStore> {
        self.open_table(name, Some(schema))
    }

    fn open_table(&self, name: &str, schema: Option<TableSchema>) -> CoreResult<RecordStore> {
        validate_table_name(name)?;
        let lock = Arc::clone(self.locks.lock().entry(name.to_string()).or_default());
        let store = RecordStore::new(name, schema, Arc::clone(&self.shared), lock);
        if store.initialize()? {
            debug!(table = name, "initialized new table");
        }
        Ok(store)
    }

    /// Checks the stored blob of `name` without opening, creating or
    /// repairing the table.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTableName`, or a storage error if the backend cannot
    /// be read.
    pub fn verify_table(&self, name: &str) -> CoreResult<VerifyReport> {
        validate_table_name(name)?;
        let lock = Arc::clone(self.locks.lock().entry(name.to_string()).or_default());
        RecordStore::new(name, None, Arc::clone(&self.shared), lock).verify()
    }

    /// Names of the tables present in storage, sorted.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend cannot be listed.
    pub fn table_names(&self) -> CoreResult<Vec<String>> {
        let prefix = format!("{}_", self.shared.config.key_prefix);
        let mut names: Vec<String> = self
            .shared
            .storage
            .keys(&prefix)?
            .into_iter()
            .filter(|key| !backup::is_backup_key(key))
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Opens the customer registry.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the table cannot be initialized.
    pub fn customers(&self) -> CoreResult<CustomerStore> {
        CustomerStore::open(self)
    }

    /// Opens the service-order register.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the table cannot be initialized.
    pub fn orders(&self) -> CoreResult<OrderStore> {
        OrderStore::open(self)
    }

    /// Opens the price catalog, seeding it on first use.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the table cannot be initialized.
    pub fn catalog(&self) -> CoreResult<CatalogStore> {
        CatalogStore::open(self)
    }
}

/// Table names become part of storage keys: ASCII letters, digits, `_` and
/// `-` only, and never the snapshot infix.
fn validate_table_name(name: &str) -> CoreResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && !name.contains(backup::BACKUP_INFIX);
    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTableName {
            name: name.to_string(),
        })
    }
}
