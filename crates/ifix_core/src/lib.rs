//! # IFIX Core
//!
//! Indexed JSON record store for the IFIX repair-shop system.
//!
//! This crate provides:
//! - [`RecordStore`] - CRUD, queries, import/export and backups over one
//!   named table, persisted as a single JSON envelope
//! - Id, date and status indexes rebuilt on load when they drift
//! - Self-healing load: legacy arrays are migrated, damaged envelopes are
//!   salvaged, unreadable ones fall back to the newest usable backup
//! - Soft-limit compaction and oldest-first eviction, and quota-aware
//!   retries against the storage backend
//! - Typed stores for customers, service orders and the price catalog
//!
//! ## Example
//!
//! ```rust
//! use ifix_core::{fields, Database};
//! use serde_json::json;
//!
//! let db = Database::in_memory();
//! let table = db.table("NOTES").unwrap();
//! let note = table.create(fields(json!({"text": "call Ana"}))).unwrap();
//! assert_eq!(table.find_by_id(&note.id).unwrap().get_str("text"), Some("call Ana"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backup;
mod config;
mod database;
pub mod entities;
mod error;
mod events;
pub mod index;
pub mod migration;
pub mod query;
mod quota;
mod record;
mod stats;
mod store;
pub mod table;
pub mod transfer;
mod types;

pub use backup::BackupInfo;
pub use config::{BackupPolicy, Config};
pub use database::Database;
pub use entities::{
    Catalog, CatalogStore, Customer, CustomerStore, NewCustomer, NewOrder, Order, OrderStatus,
    OrderStore, Price,
};
pub use error::{CoreError, CoreResult};
pub use events::{EventFeed, RecoverySource, StoreEvent};
pub use query::{Condition, FindOptions, Op, SortOrder};
pub use record::{
    fields, strip_system_fields, Fields, Record, CREATED_AT_FIELD, ID_FIELD, STATUS_FIELD,
    SYSTEM_FIELDS, UPDATED_AT_FIELD, VERSION_FIELD,
};
pub use stats::{MetricsSnapshot, StoreMetrics};
pub use store::{BatchError, BatchReport, RecordStore, TableInfo, VerifyReport};
pub use table::{TableSchema, FORMAT_VERSION};
pub use transfer::{Format, ImportOptions, ImportReport};
pub use types::{generate_id, Timestamp};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
