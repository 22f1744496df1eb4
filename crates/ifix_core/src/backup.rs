//! Table snapshots.
//!
//! A snapshot is a full copy of a table stored under
//! `<tableKey>_backup_<millis>` next to the table itself:
//!
//! ```text
//! { "created", "tableKey", "recordCount", "table": { meta, data, indexes, stats } }
//! ```
//!
//! Older snapshots in the `{ "timestamp", "count", "data": [...] }` shape are
//! still readable.

use crate::error::{CoreError, CoreResult};
use crate::migration::{self, Decoded};
use crate::table::Table;
use crate::types::Timestamp;
use ifix_storage::KeyValueStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Separator between a table key and a snapshot suffix.
pub const BACKUP_INFIX: &str = "_backup_";

/// A stored snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEnvelope {
    /// When the snapshot was taken.
    pub created: String,
    /// Key of the table it was taken from.
    pub table_key: String,
    /// Number of records in the snapshot.
    pub record_count: usize,
    /// The table as it was.
    pub table: Table,
}

/// Summary of one snapshot, as listed by `list_backups`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    /// Storage key.
    pub key: String,
    /// Creation time in Unix milliseconds, from the key suffix.
    pub created_millis: i64,
    /// Record count, when the snapshot is readable.
    pub record_count: Option<usize>,
    /// Stored size in bytes.
    pub bytes: usize,
}

/// Returns the key prefix shared by all snapshots of `table_key`.
#[must_use]
pub fn backup_prefix(table_key: &str) -> String {
    format!("{table_key}{BACKUP_INFIX}")
}

/// Returns the millisecond suffix of a snapshot key.
#[must_use]
pub fn key_millis(key: &str) -> Option<i64> {
    key.rsplit_once(BACKUP_INFIX)?.1.parse().ok()
}

/// Returns `true` if `key` names a snapshot rather than a table.
#[must_use]
pub fn is_backup_key(key: &str) -> bool {
    key_millis(key).is_some()
}

/// Snapshot keys of `table_key`, newest first.
pub(crate) fn keys(storage: &dyn KeyValueStore, table_key: &str) -> CoreResult<Vec<String>> {
    let mut keys: Vec<(i64, String)> = storage
        .keys(&backup_prefix(table_key))?
        .into_iter()
        .filter_map(|k| key_millis(&k).map(|m| (m, k)))
        .collect();
    keys.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(keys.into_iter().map(|(_, k)| k).collect())
}

/// Lists the snapshots of `table_key`, newest first.
pub(crate) fn list(storage: &dyn KeyValueStore, table_key: &str) -> CoreResult<Vec<BackupInfo>> {
    let now = Timestamp::now();
    let mut infos = Vec::new();
    for key in keys(storage, table_key)? {
        let Some(raw) = storage.get(&key)? else {
            continue;
        };
        infos.push(BackupInfo {
            created_millis: key_millis(&key).unwrap_or_default(),
            record_count: parse(&raw, now).ok().map(|t| t.len()),
            bytes: raw.len(),
            key,
        });
    }
    Ok(infos)
}

/// Writes a snapshot of `table` and returns its key.
///
/// The key suffix is `now` in milliseconds, moved past the newest existing
/// snapshot so suffixes always increase.
pub(crate) fn write(
    storage: &dyn KeyValueStore,
    table_key: &str,
    table: &Table,
    now: Timestamp,
) -> CoreResult<String> {
    let newest = keys(storage, table_key)?
        .first()
        .and_then(|k| key_millis(k));
    let millis = match newest {
        Some(newest) if newest >= now.as_millis() => newest + 1,
        _ => now.as_millis(),
    };
    let key = format!("{}{millis}", backup_prefix(table_key));

    let envelope = BackupEnvelope {
        created: now.to_string(),
        table_key: table_key.to_string(),
        record_count: table.len(),
        table: table.clone(),
    };
    storage.set(&key, &serde_json::to_string(&envelope)?)?;
    Ok(key)
}

/// Removes all but the `keep` newest snapshots. Returns how many were removed.
pub(crate) fn prune(storage: &dyn KeyValueStore, table_key: &str, keep: usize) -> CoreResult<usize> {
    let mut removed = 0;
    for key in keys(storage, table_key)?.into_iter().skip(keep) {
        if storage.remove(&key)? {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Reads the snapshot under `key`.
pub(crate) fn read(storage: &dyn KeyValueStore, key: &str, now: Timestamp) -> CoreResult<Table> {
    let raw = storage
        .get(key)?
        .ok_or_else(|| CoreError::backup_not_found(key))?;
    parse(&raw, now)
}

/// Parses a snapshot blob in either the current or the older shape.
fn parse(raw: &str, now: Timestamp) -> CoreResult<Table> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| CoreError::format(format!("backup is not valid JSON: {e}")))?;

    let decoded = match value {
        Value::Object(mut map) if map.contains_key("table") => {
            let table = map.remove("table").unwrap_or(Value::Null);
            migration::decode_value(table, now)
        }
        other => migration::decode_value(other, now),
    };
    match decoded {
        Decoded::Unusable(reason) => Err(CoreError::format(format!("unusable backup: {reason}"))),
        decoded => decoded
            .into_table()
            .ok_or_else(|| CoreError::format("unusable backup")),
    }
}
