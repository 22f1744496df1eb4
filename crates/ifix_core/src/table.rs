//! The persisted table envelope.
//!
//! Each table is stored as one JSON document:
//!
//! ```text
//! {
//!   "meta":    { "created", "version", "lastModified", "schema"?, "migratedFrom"? },
//!   "data":    [ Record, ... ],
//!   "indexes": { "byId", "byDate", "byStatus" },
//!   "stats":   { "totalItems", "lastInsertId", "lastOperation", "operationCount" }
//! }
//! ```

use crate::index::TableIndexes;
use crate::record::{Fields, Record};
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current envelope format version, stored in `meta.version`.
pub const FORMAT_VERSION: &str = "2.0";

/// `migratedFrom` marker for tables upgraded from a bare record array.
pub const LEGACY_ARRAY_MARKER: &str = "legacy-array";

/// Advisory field lists for a table.
///
/// Only `required` is enforced: on create, each listed field must be present
/// and not null, empty string, or empty array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Fields every new record must carry.
    #[serde(default)]
    pub required: Vec<String>,
    /// Fields records may carry.
    #[serde(default)]
    pub optional: Vec<String>,
}

impl TableSchema {
    /// Creates a schema with the given required fields.
    #[must_use]
    pub fn required<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: fields.into_iter().map(Into::into).collect(),
            optional: Vec::new(),
        }
    }

    /// Adds optional fields.
    #[must_use]
    pub fn with_optional<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Returns the required fields missing from `fields`.
    #[must_use]
    pub fn missing<'a>(&'a self, fields: &Fields) -> Vec<&'a str> {
        self.required
            .iter()
            .filter(|name| match fields.get(name.as_str()) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(Value::Array(a)) => a.is_empty(),
                Some(_) => false,
            })
            .map(String::as_str)
            .collect()
    }
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMeta {
    /// When the table was first created.
    pub created: String,
    /// Envelope format version.
    pub version: String,
    /// Last persisted mutation.
    pub last_modified: String,
    /// Advisory schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<TableSchema>,
    /// Shape the table was migrated from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrated_from: Option<String>,
}

impl TableMeta {
    fn new(now: Timestamp) -> Self {
        let stamp = now.to_string();
        Self {
            created: stamp.clone(),
            version: FORMAT_VERSION.to_string(),
            last_modified: stamp,
            schema: None,
            migrated_from: None,
        }
    }
}

/// Informational running counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStats {
    /// Record count at the last persist.
    pub total_items: usize,
    /// Id of the last record created.
    pub last_insert_id: Option<String>,
    /// Name of the last persisted operation.
    pub last_operation: Option<String>,
    /// Number of persisted operations.
    pub operation_count: u64,
}

/// A fully loaded table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Metadata.
    pub meta: TableMeta,
    /// Records in insertion order.
    pub data: Vec<Record>,
    /// Derived indexes.
    pub indexes: TableIndexes,
    /// Running counters.
    pub stats: TableStats,
}

impl Table {
    /// Creates an empty table.
    #[must_use]
    pub fn empty(now: Timestamp) -> Self {
        Self {
            meta: TableMeta::new(now),
            data: Vec::new(),
            indexes: TableIndexes::default(),
            stats: TableStats::default(),
        }
    }

    /// Creates a table holding `records`, with fresh indexes.
    #[must_use]
    pub fn from_records(records: Vec<Record>, now: Timestamp) -> Self {
        let mut table = Self::empty(now);
        table.indexes = TableIndexes::rebuild(&records);
        table.stats.total_items = records.len();
        table.data = records;
        table
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the table has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Looks up a record by id, through `byId` first and a scan second.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<(usize, &Record)> {
        if let Some(position) = self.indexes.position(id) {
            if let Some(record) = self.data.get(position).filter(|r| r.id == id) {
                return Some((position, record));
            }
        }
        self.data.iter().enumerate().find(|(_, r)| r.id == id)
    }

    /// Rebuilds all indexes from the records.
    pub fn reindex(&mut self) {
        self.indexes = TableIndexes::rebuild(&self.data);
    }

    /// Drops records whose id already appeared earlier. Returns how many.
    pub fn dedupe(&mut self) -> usize {
        let before = self.data.len();
        let mut seen = std::collections::HashSet::new();
        self.data.retain(|r| seen.insert(r.id.clone()));
        before - self.data.len()
    }

    /// Empties records and indexes, keeping the table's identity, creation
    /// time, schema and migration marker.
    pub fn clear(&mut self) {
        self.data.clear();
        self.indexes = TableIndexes::default();
        self.stats.total_items = 0;
    }

    /// Updates counters and `lastModified` ahead of a write.
    pub fn stamp_operation(&mut self, operation: &str, now: Timestamp) {
        self.meta.last_modified = now.to_string();
        self.stats.total_items = self.data.len();
        self.stats.last_operation = Some(operation.to_string());
        self.stats.operation_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fields;
    use serde_json::json;

    #[test]
    fn envelope_uses_documented_keys() {
        let now = Timestamp::from_millis(0);
        let mut table = Table::from_records(
            vec![Record::new("a", fields(json!({"status": "open"})), now)],
            now,
        );
        table.meta.migrated_from = Some(LEGACY_ARRAY_MARKER.into());
        table.stamp_operation("create", now);

        let value = serde_json::to_value(&table).unwrap();
        assert_eq!(value["meta"]["version"], FORMAT_VERSION);
        assert_eq!(value["meta"]["migratedFrom"], LEGACY_ARRAY_MARKER);
        assert!(value["meta"].get("schema").is_none());
        assert_eq!(value["indexes"]["byId"]["a"], 0);
        assert_eq!(value["indexes"]["byDate"][0]["index"], 0);
        assert_eq!(value["indexes"]["byStatus"]["open"][0], 0);
        assert_eq!(value["stats"]["totalItems"], 1);
        assert_eq!(value["stats"]["lastOperation"], "create");
        assert_eq!(value["stats"]["operationCount"], 1);
    }

    #[test]
    fn schema_missing_fields() {
        let schema = TableSchema::required(["name", "phone", "tags"]);
        let missing = schema.missing(&fields(json!({"name": "  ", "phone": "1", "tags": []})));
        assert_eq!(missing, vec!["name", "tags"]);
        assert!(schema
            .missing(&fields(json!({"name": "Ana", "phone": 1, "tags": ["vip"]})))
            .is_empty());
    }

    #[test]
    fn find_falls_back_to_scan() {
        let now = Timestamp::from_millis(0);
        let mut table = Table::from_records(
            vec![
                Record::new("a", Default::default(), now),
                Record::new("b", Default::default(), now),
            ],
            now,
        );
        table.indexes.by_id.clear();
        assert_eq!(table.find("b").map(|(p, _)| p), Some(1));
        assert!(table.find("z").is_none());
    }

    #[test]
    fn clear_keeps_identity() {
        let now = Timestamp::from_millis(0);
        let mut table = Table::from_records(vec![Record::new("a", Default::default(), now)], now);
        table.meta.schema = Some(TableSchema::required(["name"]));
        let created = table.meta.created.clone();

        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.meta.created, created);
        assert!(table.meta.schema.is_some());
        assert!(table.indexes.by_id.is_empty());
    }

    #[test]
    fn dedupe_keeps_first() {
        let now = Timestamp::from_millis(0);
        let mut table = Table::empty(now);
        table.data = vec![
            Record::new("a", fields(json!({"n": 1})), now),
            Record::new("a", fields(json!({"n": 2})), now),
        ];
        assert_eq!(table.dedupe(), 1);
        assert_eq!(table.data[0].get("n"), Some(&json!(1)));
    }
}
