//! Decoding stored table blobs, with structural migration and repair.
//!
//! A blob is classified into one of the load levels:
//!
//! 1. **Current** - a strict envelope at [`FORMAT_VERSION`]; only the
//!    indexes are checked and rebuilt if they disagree with the records
//! 2. **Envelope drift** - an object with a `data` array whose other parts
//!    are damaged, missing or from an older format; records are salvaged
//! 3. **Legacy** - a bare array of records
//! 4. **Unusable** - anything else; the caller falls back to a backup or
//!    an empty table
//!
//! Decoding never fails. It is also idempotent: decoding the serialization
//! of a decoded table yields [`Decoded::Current`].

use crate::events::RecoverySource;
use crate::record::Record;
use crate::table::{Table, TableMeta, TableSchema, TableStats, FORMAT_VERSION, LEGACY_ARRAY_MARKER};
use crate::types::Timestamp;
use serde_json::Value;

/// Outcome of decoding a stored blob.
#[derive(Debug)]
pub enum Decoded {
    /// The blob was a current, consistent envelope.
    Current(Table),
    /// The blob was usable after repair.
    Repaired {
        /// The repaired table.
        table: Table,
        /// Which repair was needed.
        source: RecoverySource,
        /// Entries dropped during repair.
        dropped: usize,
    },
    /// The blob has no usable shape.
    Unusable(String),
}

impl Decoded {
    /// Returns the table, if one could be decoded.
    #[must_use]
    pub fn into_table(self) -> Option<Table> {
        match self {
            Self::Current(table) | Self::Repaired { table, .. } => Some(table),
            Self::Unusable(_) => None,
        }
    }
}

/// Decodes a raw blob.
#[must_use]
pub fn decode(raw: &str, now: Timestamp) -> Decoded {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => decode_value(value, now),
        Err(e) => Decoded::Unusable(format!("not valid JSON: {e}")),
    }
}

/// Decodes an already parsed blob.
#[must_use]
pub fn decode_value(value: Value, now: Timestamp) -> Decoded {
    match value {
        Value::Array(items) => {
            let (records, dropped) = salvage_records(items, now);
            let mut table = Table::from_records(records, now);
            table.meta.migrated_from = Some(LEGACY_ARRAY_MARKER.to_string());
            Decoded::Repaired {
                table,
                source: RecoverySource::LegacyArray,
                dropped,
            }
        }
        Value::Object(map) if map.get("data").is_some_and(Value::is_array) => {
            decode_envelope(map, now)
        }
        Value::Object(_) => Decoded::Unusable("object without a data array".to_string()),
        other => Decoded::Unusable(format!("unexpected {} at top level", kind(&other))),
    }
}

fn decode_envelope(mut map: serde_json::Map<String, Value>, now: Timestamp) -> Decoded {
    if let Ok(mut table) = serde_json::from_value::<Table>(Value::Object(map.clone())) {
        if table.meta.version == FORMAT_VERSION {
            let dropped = table.dedupe();
            if dropped == 0 && table.indexes.is_consistent(&table.data) {
                return Decoded::Current(table);
            }
            table.reindex();
            table.stats.total_items = table.data.len();
            return Decoded::Repaired {
                table,
                source: RecoverySource::Reindexed,
                dropped,
            };
        }
    }

    let items = match map.remove("data") {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    let (records, dropped) = salvage_records(items, now);
    let mut table = Table::from_records(records, now);
    if let Some(meta) = map.remove("meta") {
        carry_meta(&mut table.meta, meta);
    }
    if let Some(stats) = map
        .remove("stats")
        .and_then(|s| serde_json::from_value::<TableStats>(s).ok())
    {
        table.stats = TableStats {
            total_items: table.data.len(),
            ..stats
        };
    }

    Decoded::Repaired {
        table,
        source: RecoverySource::Salvaged,
        dropped,
    }
}

/// Keeps whatever parts of a damaged `meta` object are still readable.
fn carry_meta(meta: &mut TableMeta, value: Value) {
    let Value::Object(mut old) = value else {
        return;
    };
    if let Some(created) = old
        .get("created")
        .and_then(Value::as_str)
        .and_then(Timestamp::parse)
    {
        meta.created = created.to_string();
    }
    meta.schema = old
        .remove("schema")
        .and_then(|s| serde_json::from_value::<TableSchema>(s).ok());
    meta.migrated_from = old
        .remove("migratedFrom")
        .and_then(|m| m.as_str().map(str::to_string));
}

/// Salvages record-like entries, keeping the first of any duplicate id.
fn salvage_records(items: Vec<Value>, now: Timestamp) -> (Vec<Record>, usize) {
    let total = items.len();
    let mut seen = std::collections::HashSet::new();
    let records: Vec<Record> = items
        .into_iter()
        .filter_map(|item| Record::salvage(item, now))
        .filter(|r| seen.insert(r.id.clone()))
        .collect();
    let dropped = total - records.len();
    (records, dropped)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
