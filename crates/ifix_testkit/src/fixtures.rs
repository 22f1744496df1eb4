//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use ifix_core::{Config, Database};
use ifix_storage::{FileStore, InMemoryStore, KeyValueStore};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The backend, for reading and planting raw blobs.
    pub storage: Arc<dyn KeyValueStore>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self::memory_with(InMemoryStore::new(), Config::default())
    }

    /// Creates an in-memory test database over `store`.
    pub fn memory_with(store: InMemoryStore, config: Config) -> Self {
        let storage: Arc<dyn KeyValueStore> = Arc::new(store);
        Self {
            db: Database::with_storage(Arc::clone(&storage), config),
            storage,
            temp_dir: None,
        }
    }

    /// Creates a new file-based test database.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(temp_dir.path()).expect("Failed to open file store");
        let storage: Arc<dyn KeyValueStore> = Arc::new(store);
        Self {
            db: Database::with_storage(Arc::clone(&storage), Config::default()),
            storage,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the data directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Writes `raw` under the storage key of `table`, bypassing the store.
    pub fn plant(&self, table: &str, raw: &str) {
        self.storage
            .set(&self.db.config().table_key(table), raw)
            .expect("Failed to plant blob");
    }

    /// Reads the stored blob of `table`.
    pub fn raw(&self, table: &str) -> Option<String> {
        self.storage
            .get(&self.db.config().table_key(table))
            .expect("Failed to read blob")
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
///
/// # Example
///
/// ```rust,ignore
/// use ifix_testkit::with_temp_db;
///
/// #[test]
/// fn my_test() {
///     with_temp_db(|db| {
///         let table = db.table("TEST").unwrap();
///         // ... test operations
///     });
/// }
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a temporary file-based database.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db.path().expect("File database should have a path");
    f(&test_db.db, path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use ifix_core::entities::{NewCustomer, NewOrder};
    use ifix_core::{fields, Record};
    use serde_json::{json, Value};

    const STATUSES: [&str; 3] = ["open", "waiting", "closed"];

    /// Creates `count` records in `table`, cycling through three statuses.
    pub fn populate(db: &Database, table: &str, count: usize) -> Vec<Record> {
        let store = db.table(table).expect("Failed to open table");
        (0..count)
            .map(|i| {
                store
                    .create(fields(json!({
                        "index": i,
                        "status": STATUSES[i % STATUSES.len()],
                        "label": format!("item {i}"),
                    })))
                    .expect("Failed to create record")
            })
            .collect()
    }

    /// Creates a database with one populated table.
    pub fn populated_database(table: &str, count: usize) -> TestDatabase {
        let test_db = TestDatabase::memory();
        populate(&test_db.db, table, count);
        test_db
    }

    /// A shop with `customers` customers and one open order each. Returns
    /// the customer and order ids.
    pub fn shop(db: &Database, customers: usize) -> (Vec<String>, Vec<String>) {
        let customer_store = db.customers().expect("Failed to open customers");
        let order_store = db.orders().expect("Failed to open orders");
        let mut customer_ids = Vec::with_capacity(customers);
        let mut order_ids = Vec::with_capacity(customers);

        for i in 0..customers {
            let customer = customer_store
                .create_customer(NewCustomer::new(
                    format!("Cliente {i}"),
                    format!("1199999{i:04}"),
                ))
                .expect("Failed to create customer");
            let order = order_store
                .create_order(NewOrder {
                    labor_cost: 100.0,
                    parts_cost: 50.0 * (i as f64 + 1.0),
                    customer_name: customer.name.clone(),
                    ..NewOrder::new(&customer.id, "IPHONE 11", "TROCA DE TELA")
                })
                .expect("Failed to create order");
            customer_ids.push(customer.id);
            order_ids.push(order.id);
        }
        (customer_ids, order_ids)
    }

    /// A bare JSON array of customers as older versions of the shop app
    /// stored them: camelCase timestamps and no system fields.
    pub fn legacy_customers(count: usize) -> String {
        let rows: Vec<Value> = (0..count)
            .map(|i| {
                json!({
                    "id": format!("cust_legacy_{i}"),
                    "name": format!("Cliente {i}"),
                    "phone": format!("(11) 99999-{i:04}"),
                    "status": "active",
                    "createdAt": format!("2023-0{}-15T10:00:00.000Z", i % 9 + 1),
                })
            })
            .collect();
        Value::Array(rows).to_string()
    }
}
