//! Degradation steps applied when a table outgrows the storage budget.
//!
//! The store applies them in order until the serialized table fits:
//! compaction, pruning of the table's snapshots, then eviction of the
//! oldest records.

use crate::table::Table;
use serde_json::Value;

/// Removes null, empty-string, empty-array and empty-object domain fields
/// from every record. Returns how many fields were removed.
pub(crate) fn compact(table: &mut Table) -> usize {
    let mut removed = 0;
    for record in &mut table.data {
        let before = record.fields.len();
        record.fields.retain(|_, value| !is_empty(value));
        removed += before - record.fields.len();
    }
    removed
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Number of records one eviction round removes: `ratio` of `len`, rounded
/// up, at least one.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub(crate) fn eviction_batch(len: usize, ratio: f64) -> usize {
    if len == 0 {
        return 0;
    }
    let batch = (len as f64 * ratio).ceil() as usize;
    batch.clamp(1, len)
}

/// Evicts the `count` oldest records by `byDate` and rebuilds the indexes.
/// The record `keep`, if any, is never evicted. Returns the evicted ids.
pub(crate) fn evict_oldest(table: &mut Table, count: usize, keep: Option<&str>) -> Vec<String> {
    table.reindex();
    let mut positions: Vec<usize> = table
        .indexes
        .by_date
        .iter()
        .rev()
        .filter(|e| Some(e.id.as_str()) != keep)
        .take(count)
        .map(|e| e.index)
        .collect();
    positions.sort_unstable_by(|a, b| b.cmp(a));

    let mut evicted = Vec::with_capacity(positions.len());
    for position in positions {
        evicted.push(table.data.remove(position).id);
    }
    table.reindex();
    evicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{fields, Record};
    use crate::types::Timestamp;
    use serde_json::json;

    #[test]
    fn compact_drops_only_empty_fields() {
        let now = Timestamp::from_millis(0);
        let mut table = Table::from_records(
            vec![Record::new(
                "a",
                fields(json!({
                    "name": "Ana", "email": "", "tags": [], "address": {},
                    "lastService": null, "totalSpent": 0, "active": false,
                })),
                now,
            )],
            now,
        );

        assert_eq!(compact(&mut table), 4);
        let kept: Vec<_> = table.data[0].fields.keys().cloned().collect();
        assert_eq!(kept, vec!["active", "name", "totalSpent"]);
        assert_eq!(compact(&mut table), 0);
    }

    #[test]
    fn eviction_batch_sizes() {
        assert_eq!(eviction_batch(0, 0.1), 0);
        assert_eq!(eviction_batch(3, 0.1), 1);
        assert_eq!(eviction_batch(100, 0.1), 10);
        assert_eq!(eviction_batch(101, 0.1), 11);
        assert_eq!(eviction_batch(5, 0.0), 1);
        assert_eq!(eviction_batch(5, 1.0), 5);
    }

    #[test]
    fn evicts_oldest_by_creation_date() {
        let records = [("new", 3_000), ("old", 1_000), ("mid", 2_000), ("oldest", 500)]
            .into_iter()
            .map(|(id, millis)| Record::new(id, Default::default(), Timestamp::from_millis(millis)))
            .collect();
        let mut table = Table::from_records(records, Timestamp::from_millis(0));

        let evicted = evict_oldest(&mut table, 2, None);
        assert_eq!(evicted.len(), 2);
        assert!(evicted.contains(&"oldest".to_string()));
        assert!(evicted.contains(&"old".to_string()));

        let ids: Vec<_> = table.data.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);
        assert!(table.indexes.is_consistent(&table.data));
    }

    #[test]
    fn kept_record_is_never_evicted() {
        let records = [("a", 1_000), ("b", 2_000), ("c", 3_000)]
            .into_iter()
            .map(|(id, millis)| Record::new(id, Default::default(), Timestamp::from_millis(millis)))
            .collect();
        let mut table = Table::from_records(records, Timestamp::from_millis(0));

        let evicted = evict_oldest(&mut table, 5, Some("a"));
        assert_eq!(evicted.len(), 2);
        assert!(!evicted.contains(&"a".to_string()));
        assert_eq!(table.len(), 1);
        assert_eq!(table.data[0].id, "a");
        assert!(evict_oldest(&mut table, 1, Some("a")).is_empty());
    }
}
