//! # IFIX Storage
//!
//! Key-value storage port and backends for the IFIX record store.
//!
//! This crate provides the lowest-level persistence abstraction. Backends
//! are **opaque string stores** - they map keys to serialized values and do
//! not interpret what they hold.
//!
//! ## Design Principles
//!
//! - Backends are simple key-value stores (get, set, remove, keys)
//! - No knowledge of table envelopes, indexes or backups
//! - Must be `Send + Sync` so a store can be shared behind an `Arc`
//! - Writes may be rejected with [`StorageError::QuotaExceeded`], mirroring
//!   the size ceiling of browser local storage
//!
//! ## Available Backends
//!
//! - [`InMemoryStore`] - For testing and ephemeral storage
//! - [`FileStore`] - One file per key inside a locked directory
//!
//! ## Example
//!
//! ```rust
//! use ifix_storage::{KeyValueStore, InMemoryStore};
//!
//! let store = InMemoryStore::new();
//! store.set("IFIX_CUSTOMERS", "[]").unwrap();
//! assert_eq!(store.get("IFIX_CUSTOMERS").unwrap().as_deref(), Some("[]"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::KeyValueStore;
pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
