//! Typed stores for the repair-shop entities.
//!
//! Each store wraps a [`RecordStore`](crate::RecordStore) opened with the
//! entity's schema and id prefix, and converts records to entity structs
//! through serde. Records that do not have the entity's shape (metadata rows
//! left by older versions, hand-edited imports) stay in the table but are
//! skipped by the typed views.

mod catalog;
mod customers;
mod orders;

pub use catalog::{Catalog, CatalogStore, Price, CATALOG_ID};
pub use customers::{
    format_phone, is_valid_document, is_valid_email, Address, Customer, CustomerSearch,
    CustomerStats, CustomerStore, NewCustomer,
};
pub use orders::{
    DateRange, MonthStats, NewOrder, NewPart, Order, OrderSearch, OrderStats, OrderStatus,
    OrderStore, Part, PaymentStatus, Priority, RankedCount, RevenueLine, RevenueReport,
    TechnicianStats,
};

use crate::record::Record;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

/// Deserializes `null` as the type's default, for fields older rows stored
/// as `null` instead of leaving them out.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Converts records into entities, skipping those that do not fit `T`.
fn typed<T: DeserializeOwned>(table: &str, records: Vec<Record>) -> Vec<T> {
    records
        .into_iter()
        .filter_map(|record| match record.to_entity() {
            Ok(entity) => Some(entity),
            Err(e) => {
                debug!(table, id = %record.id, error = %e, "skipping record with foreign shape");
                None
            }
        })
        .collect()
}

/// Strips everything but ASCII digits.
fn digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

/// Returns `true` if the id or any field of `record` contains `term`
/// (lowercase).
fn mentions(record: &Record, term: &str) -> bool {
    record.id.to_lowercase().contains(term)
        || record.fields.values().any(|value| match value {
            Value::Null => false,
            Value::String(s) => s.to_lowercase().contains(term),
            other => other.to_string().to_lowercase().contains(term),
        })
}
