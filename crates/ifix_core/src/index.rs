//! Derived lookup structures over a table's record sequence.
//!
//! All three indexes store **positions** into the record vector:
//!
//! - `byId`: id → position, for O(1) point lookups
//! - `byDate`: `{id, date, index}` sorted newest first
//! - `byStatus`: status value → ascending positions; a record whose status
//!   is an array is filed under each of its string elements
//!
//! They are never the source of truth; [`TableIndexes::rebuild`] recreates
//! them from the records in one pass.

use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// An entry of the `byDate` index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateEntry {
    /// Record id.
    pub id: String,
    /// The record's creation timestamp.
    pub date: String,
    /// Position of the record.
    pub index: usize,
}

/// Newest first; among equal dates the later position comes first.
fn date_order(a: &DateEntry, b: &DateEntry) -> Ordering {
    b.date.cmp(&a.date).then(b.index.cmp(&a.index))
}

/// The secondary indexes of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableIndexes {
    /// id → position.
    pub by_id: BTreeMap<String, usize>,
    /// Records sorted by descending creation date.
    pub by_date: Vec<DateEntry>,
    /// status → ascending positions.
    pub by_status: BTreeMap<String, Vec<usize>>,
}

impl TableIndexes {
    /// Builds all indexes from `records` in a single pass.
    ///
    /// If two records share an id, `byId` points at the first one.
    #[must_use]
    pub fn rebuild(records: &[Record]) -> Self {
        let mut indexes = Self::default();
        for (position, record) in records.iter().enumerate() {
            indexes
                .by_id
                .entry(record.id.clone())
                .or_insert(position);
            indexes.by_date.push(DateEntry {
                id: record.id.clone(),
                date: record.created_at.clone(),
                index: position,
            });
            for status in record.status_keys() {
                indexes
                    .by_status
                    .entry(status.to_string())
                    .or_default()
                    .push(position);
            }
        }
        indexes.by_date.sort_by(date_order);
        indexes
    }

    /// Returns the position of `id`, if indexed.
    #[must_use]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    /// Returns `true` if `id` is indexed.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Positions holding `status`, ascending.
    #[must_use]
    pub fn status_positions(&self, status: &str) -> &[usize] {
        self.by_status.get(status).map_or(&[], Vec::as_slice)
    }

    /// Indexes a record just appended at `position`.
    pub fn insert(&mut self, record: &Record, position: usize) {
        self.by_id.insert(record.id.clone(), position);

        let entry = DateEntry {
            id: record.id.clone(),
            date: record.created_at.clone(),
            index: position,
        };
        let at = self
            .by_date
            .partition_point(|e| date_order(e, &entry) == Ordering::Less);
        self.by_date.insert(at, entry);

        for status in record.status_keys() {
            insert_sorted(self.by_status.entry(status.to_string()).or_default(), position);
        }
    }

    /// Moves `position` from the `old` status groups to the `new` ones.
    pub fn change_status(&mut self, position: usize, old: &[&str], new: &[&str]) {
        for status in old.iter().filter(|s| !new.contains(s)) {
            if let Some(group) = self.by_status.get_mut(*status) {
                group.retain(|p| *p != position);
                if group.is_empty() {
                    self.by_status.remove(*status);
                }
            }
        }
        for status in new {
            insert_sorted(self.by_status.entry((*status).to_string()).or_default(), position);
        }
    }

    /// Forgets the record `id` that lived at `position` and shifts every
    /// reference to a later position down by one.
    pub fn remove(&mut self, id: &str, position: usize) {
        self.by_id.remove(id);
        for p in self.by_id.values_mut() {
            if *p > position {
                *p -= 1;
            }
        }

        self.by_date.retain(|e| e.index != position);
        for e in &mut self.by_date {
            if e.index > position {
                e.index -= 1;
            }
        }

        self.by_status.retain(|_, group| {
            group.retain(|p| *p != position);
            for p in group.iter_mut() {
                if *p > position {
                    *p -= 1;
                }
            }
            !group.is_empty()
        });
    }

    /// Checks the indexes against `records` and describes every mismatch.
    ///
    /// An empty result means the indexes are consistent.
    #[must_use]
    pub fn check(&self, records: &[Record]) -> Vec<String> {
        let mut issues = Vec::new();

        if self.by_id.len() != records.len() {
            issues.push(format!(
                "byId has {} entries for {} records",
                self.by_id.len(),
                records.len()
            ));
        }
        for (id, &position) in &self.by_id {
            match records.get(position) {
                None => issues.push(format!("byId {id} points past the end ({position})")),
                Some(r) if r.id != *id => issues.push(format!(
                    "byId {id} points at position {position} holding {}",
                    r.id
                )),
                Some(_) => {}
            }
        }
        for (position, record) in records.iter().enumerate() {
            if self.by_id.get(&record.id) != Some(&position) {
                issues.push(format!("record {} at {position} is not indexed", record.id));
            }
        }

        if self.by_date.len() != records.len() {
            issues.push(format!(
                "byDate has {} entries for {} records",
                self.by_date.len(),
                records.len()
            ));
        }
        if self
            .by_date
            .iter()
            .any(|e| records.get(e.index).map_or(true, |r| r.id != e.id))
        {
            issues.push("byDate references a wrong position".to_string());
        }
        let mut covered = vec![false; records.len()];
        for e in &self.by_date {
            match covered.get_mut(e.index) {
                Some(seen) if *seen => {
                    issues.push(format!("byDate lists position {} more than once", e.index));
                }
                Some(seen) => *seen = true,
                None => {}
            }
        }
        for (position, record) in records.iter().enumerate() {
            if !covered[position] {
                issues.push(format!("record {} at {position} is missing from byDate", record.id));
            }
        }
        if self
            .by_date
            .windows(2)
            .any(|w| date_order(&w[0], &w[1]) == Ordering::Greater)
        {
            issues.push("byDate is not sorted".to_string());
        }

        let expected_status = Self::rebuild(records).by_status;
        if expected_status != self.by_status {
            issues.push("byStatus does not match record statuses".to_string());
        }

        issues
    }

    /// Returns `true` if [`Self::check`] finds nothing.
    #[must_use]
    pub fn is_consistent(&self, records: &[Record]) -> bool {
        self.check(records).is_empty()
    }
}

fn insert_sorted(group: &mut Vec<usize>, position: usize) {
    if let Err(at) = group.binary_search(&position) {
        group.insert(at, position);
    }
}
