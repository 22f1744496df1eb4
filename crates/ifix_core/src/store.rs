//! The record store: CRUD, queries, snapshots and maintenance over one table.
//!
//! Every operation takes the table's lock, reloads the stored blob, works on
//! the decoded [`Table`] and, for writes, serializes it back. Nothing is
//! cached between calls.
//!
//! Read operations never fail: if the table cannot be loaded they log the
//! problem and answer from an empty table. Write operations propagate
//! storage and validation errors.

use crate::backup::{self, BackupInfo};
use crate::config::BackupPolicy;
use crate::database::Shared;
use crate::error::{CoreError, CoreResult};
use crate::events::{RecoverySource, StoreEvent};
use crate::migration::{self, Decoded};
use crate::query::{matches_all, Condition, FindOptions};
use crate::quota;
use crate::record::{strip_system_fields, Fields, Record, ID_FIELD};
use crate::table::{Table, TableMeta, TableSchema, TableStats, FORMAT_VERSION};
use crate::transfer::{self, Format, ImportOptions, ImportReport};
use crate::types::{generate_id, Timestamp};
use ifix_storage::{KeyValueStore, StorageError};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A rejected item of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchError {
    /// Position of the item in the input.
    pub index: usize,
    /// Why it was rejected.
    pub message: String,
}

/// Outcome of `create_many`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    /// Records written, in input order. Items carrying the id of an
    /// existing record were merged onto it.
    pub created: Vec<Record>,
    /// Number of rejected items.
    pub failed: usize,
    /// One entry per rejected item.
    pub errors: Vec<BatchError>,
}

/// Result of checking a stored table without repairing it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// Table name.
    pub table: String,
    /// Records in the stored blob, when it could be read.
    pub records: usize,
    /// Problems found. Empty when the table is healthy.
    pub issues: Vec<String>,
}

impl VerifyReport {
    /// Returns `true` if no issues were found.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Summary of a table, as shown by `inspect`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Storage key.
    pub key: String,
    /// Number of records.
    pub records: usize,
    /// Serialized size in bytes.
    pub bytes: usize,
    /// Stored metadata.
    pub meta: TableMeta,
    /// Stored counters.
    pub stats: TableStats,
    /// Number of snapshots.
    pub backups: usize,
}

/// Handle to one table.
///
/// Obtained from [`crate::Database::table`]. Handles are cheap to clone;
/// all handles for the same table share one lock.
///
/// ```rust
/// use ifix_core::{fields, Database};
/// use serde_json::json;
///
/// let db = Database::in_memory();
/// let customers = db.table("CUSTOMERS").unwrap();
///
/// let ana = customers.create(fields(json!({"name": "Ana", "phone": "123"}))).unwrap();
/// assert_eq!(ana.version, 1);
///
/// let ana = customers.update(&ana.id, fields(json!({"phone": "456"}))).unwrap();
/// assert_eq!(ana.get_str("name"), Some("Ana"));
/// assert_eq!(ana.version, 2);
/// ```
#[derive(Clone)]
pub struct RecordStore {
    name: String,
    key: String,
    id_prefix: String,
    schema: Option<TableSchema>,
    shared: Arc<Shared>,
    lock: Arc<Mutex<()>>,
}

impl fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStore")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("id_prefix", &self.id_prefix)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl RecordStore {
    pub(crate) fn new(
        name: &str,
        schema: Option<TableSchema>,
        shared: Arc<Shared>,
        lock: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            key: shared.config.table_key(name),
            id_prefix: name.to_ascii_lowercase(),
            name: name.to_string(),
            schema,
            shared,
            lock,
        }
    }

    /// Uses `prefix` for generated ids instead of the lowercased table name.
    #[must_use]
    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage key of the table.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Schema enforced on create, if one was given when opening the table.
    #[must_use]
    pub fn schema(&self) -> Option<&TableSchema> {
        self.schema.as_ref()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Returns the records selected by `options`.
    #[must_use]
    pub fn find_all(&self, options: &FindOptions<'_>) -> Vec<Record> {
        options.apply(self.read().data)
    }

    /// Looks up a record by id.
    #[must_use]
    pub fn find_by_id(&self, id: &str) -> Option<Record> {
        let table = self.read();
        self.shared.metrics.record_index_lookup();
        table.find(id).map(|(_, record)| record.clone())
    }

    /// Returns the records whose `field` equals `value`, or contains it when
    /// the field is an array.
    #[must_use]
    pub fn find_by_field(&self, field: &str, value: impl Into<Value>) -> Vec<Record> {
        self.find_where(&[Condition::eq(field, value)], &FindOptions::new())
    }

    /// Returns the records matching every condition.
    ///
    /// A top-level `status` equality is answered from the `byStatus` index;
    /// results keep insertion order unless `options` sorts them.
    #[must_use]
    pub fn find_where(&self, conditions: &[Condition], options: &FindOptions<'_>) -> Vec<Record> {
        let table = self.read();
        let matched: Vec<Record> = match conditions.iter().find_map(Condition::status_equality) {
            Some(status) => {
                self.shared.metrics.record_index_lookup();
                table
                    .indexes
                    .status_positions(status)
                    .iter()
                    .filter_map(|&position| table.data.get(position))
                    .filter(|record| matches_all(conditions, record))
                    .cloned()
                    .collect()
            }
            None => {
                self.shared.metrics.record_scan();
                table
                    .data
                    .iter()
                    .filter(|record| matches_all(conditions, record))
                    .cloned()
                    .collect()
            }
        };
        options.apply(matched)
    }

    /// Returns up to `limit` records, newest first.
    #[must_use]
    pub fn find_recent(&self, limit: usize) -> Vec<Record> {
        let table = self.read();
        table
            .indexes
            .by_date
            .iter()
            .filter_map(|entry| table.data.get(entry.index))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of records.
    #[must_use]
    pub fn count(&self) -> usize {
        self.read().len()
    }

    /// Number of records matching every condition.
    #[must_use]
    pub fn count_where(&self, conditions: &[Condition]) -> usize {
        self.read()
            .data
            .iter()
            .filter(|record| matches_all(conditions, record))
            .count()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Creates a record.
    ///
    /// A caller-supplied `id` is honored; if a record with that id exists
    /// the fields are merged onto it instead.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the table schema's required fields are
    /// missing, or a storage error if the table cannot be written.
    pub fn create(&self, fields: Fields) -> CoreResult<Record> {
        self.locked(|table| {
            let id = supplied_id(&fields);
            let existing = id.as_deref().and_then(|id| table.find(id)).map(|(p, _)| p);
            let record = match existing {
                Some(position) => {
                    self.snapshot_before(table, false);
                    debug!(table = %self.name, id = ?id, "create with existing id, merging");
                    apply_update(table, position, fields)
                }
                None => {
                    self.validate(table, &fields)?;
                    self.snapshot_before(table, false);
                    self.insert(table, fields, id)
                }
            };
            self.persist_keeping(table, "create", Some(&record.id))?;
            Ok(record)
        })
    }

    /// Creates many records with a single write.
    ///
    /// Invalid items are reported and skipped; they never abort the batch.
    /// If the final write fails nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the table cannot be written.
    pub fn create_many<I>(&self, items: I) -> CoreResult<BatchReport>
    where
        I: IntoIterator<Item = Fields>,
    {
        self.locked(|table| {
            self.snapshot_before(table, true);
            let mut report = BatchReport::default();

            for (index, fields) in items.into_iter().enumerate() {
                let id = supplied_id(&fields);
                let existing = id.as_deref().and_then(|id| table.find(id)).map(|(p, _)| p);
                if let Some(position) = existing {
                    report.created.push(apply_update(table, position, fields));
                    continue;
                }
                match self.validate(table, &fields) {
                    Ok(()) => report.created.push(self.insert(table, fields, id)),
                    Err(e) => {
                        report.failed += 1;
                        report.errors.push(BatchError {
                            index,
                            message: e.to_string(),
                        });
                    }
                }
            }

            if !report.created.is_empty() {
                table.reindex();
                self.persist(table, "createMany")?;
            }
            debug!(
                table = %self.name,
                created = report.created.len(),
                failed = report.failed,
                "batch create finished"
            );
            Ok(report)
        })
    }

    /// Merges `patch` onto the record `id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record does not exist.
    pub fn update(&self, id: &str, patch: Fields) -> CoreResult<Record> {
        self.locked(|table| {
            let position = self.position(table, id)?;
            self.snapshot_before(table, false);
            let record = apply_update(table, position, patch);
            self.persist_keeping(table, "update", Some(&record.id))?;
            Ok(record)
        })
    }

    /// Like [`Self::update`], but only if the stored `_version` is `expected`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record does not exist and `VersionConflict`
    /// if it was modified since the caller read it.
    pub fn update_versioned(&self, id: &str, expected: u64, patch: Fields) -> CoreResult<Record> {
        self.locked(|table| {
            let position = self.position(table, id)?;
            let actual = table.data[position].version;
            if actual != expected {
                return Err(CoreError::VersionConflict {
                    id: id.to_string(),
                    expected,
                    actual,
                });
            }
            self.snapshot_before(table, false);
            let record = apply_update(table, position, patch);
            self.persist_keeping(table, "update", Some(&record.id))?;
            Ok(record)
        })
    }

    /// Updates the record `id` if it exists, otherwise creates it with that id.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a blank id or missing required fields.
    pub fn upsert(&self, id: &str, fields: Fields) -> CoreResult<Record> {
        let id = id.trim();
        if id.is_empty() {
            return Err(CoreError::validation(&self.name, "id must not be empty"));
        }
        self.locked(|table| {
            let record = match table.find(id).map(|(p, _)| p) {
                Some(position) => {
                    self.snapshot_before(table, false);
                    apply_update(table, position, fields)
                }
                None => {
                    self.validate(table, &fields)?;
                    self.snapshot_before(table, false);
                    self.insert(table, fields, Some(id.to_string()))
                }
            };
            self.persist_keeping(table, "upsert", Some(&record.id))?;
            Ok(record)
        })
    }

    /// Deletes the record `id`. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the table cannot be written.
    pub fn delete(&self, id: &str) -> CoreResult<bool> {
        self.locked(|table| {
            let Some(position) = table.find(id).map(|(p, _)| p) else {
                debug!(table = %self.name, id, "delete of missing record");
                return Ok(false);
            };
            self.snapshot_before(table, true);
            table.data.remove(position);
            table.indexes.remove(id, position);
            self.persist(table, "delete")?;
            self.shared.metrics.record_delete();
            Ok(true)
        })
    }

    /// Removes every record, keeping the table's metadata.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the table cannot be written.
    pub fn clear(&self) -> CoreResult<()> {
        self.locked(|table| {
            self.snapshot_before(table, true);
            let removed = table.len();
            table.clear();
            self.persist(table, "clear")?;
            info!(table = %self.name, removed, "table cleared");
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Export / import
    // ------------------------------------------------------------------

    /// Serializes every record in `format`.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn export(&self, format: Format) -> CoreResult<String> {
        let table = self.read();
        match format {
            Format::Json => transfer::to_json(&table.data),
            Format::Csv => Ok(transfer::to_csv(&table.data)),
        }
    }

    /// Imports records from `data`.
    ///
    /// Rows keep their id, timestamps and `_version` when present and valid;
    /// rows without an id get a generated one. A row whose id already exists
    /// is merged onto that record.
    ///
    /// # Errors
    ///
    /// Returns `Format` if `data` cannot be parsed at all; nothing is changed
    /// in that case. Per-row problems are counted in the report.
    pub fn import(&self, data: &str, options: ImportOptions) -> CoreResult<ImportReport> {
        let rows: Vec<Result<Value, String>> = match options.format {
            Format::Json => transfer::parse_json(data)?.into_iter().map(Ok).collect(),
            Format::Csv => transfer::parse_csv(data)?,
        };

        self.locked(|table| {
            self.snapshot_before(table, true);
            if options.clear_before_import {
                table.clear();
            }

            let now = Timestamp::now();
            let mut report = ImportReport::default();
            for (row_number, row) in rows.into_iter().enumerate().map(|(i, r)| (i + 1, r)) {
                let mut map = match row {
                    Ok(Value::Object(map)) => map,
                    Ok(_) => {
                        reject(&mut report, format!("row {row_number}: not an object"));
                        continue;
                    }
                    Err(message) => {
                        reject(&mut report, message);
                        continue;
                    }
                };
                if supplied_id(&map).is_none() {
                    map.insert(ID_FIELD.to_string(), Value::String(self.unique_id(table)));
                }
                let Some(record) = Record::salvage(Value::Object(map), now) else {
                    reject(&mut report, format!("row {row_number}: unusable record"));
                    continue;
                };

                if let Some(position) = table.find(&record.id).map(|(p, _)| p) {
                    apply_update(table, position, record.fields);
                    report.merged += 1;
                } else if let Err(e) = self.validate(table, &record.fields) {
                    reject(&mut report, format!("row {row_number}: {e}"));
                } else {
                    let position = table.data.len();
                    table.indexes.insert(&record, position);
                    table.data.push(record);
                    report.imported += 1;
                }
            }

            table.reindex();
            self.persist(table, "import")?;
            info!(
                table = %self.name,
                format = %options.format,
                imported = report.imported,
                merged = report.merged,
                skipped = report.skipped,
                "import finished"
            );
            Ok(report)
        })
    }

    // ------------------------------------------------------------------
    // Backups
    // ------------------------------------------------------------------

    /// Snapshots the table and prunes snapshots beyond the retention limit.
    /// Returns the snapshot key.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the snapshot cannot be written.
    pub fn create_backup(&self) -> CoreResult<String> {
        self.locked(|table| self.snapshot(table))
    }

    /// Lists the table's snapshots, newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend cannot be read.
    pub fn list_backups(&self) -> CoreResult<Vec<BackupInfo>> {
        backup::list(self.storage(), &self.key)
    }

    /// Replaces the table with the snapshot under `key`, or the latest one.
    ///
    /// The current contents are snapshotted first, subject to the backup
    /// policy. Returns the number of restored records.
    ///
    /// # Errors
    ///
    /// Returns `BackupNotFound` if there is no such snapshot and `Format` if
    /// it is unreadable.
    pub fn restore_from_backup(&self, key: Option<&str>) -> CoreResult<usize> {
        let _guard = self.lock.lock();
        let storage = self.storage();

        let key = match key {
            Some(key) if key.starts_with(&backup::backup_prefix(&self.key)) => key.to_string(),
            Some(key) => return Err(CoreError::backup_not_found(key)),
            None => backup::keys(storage, &self.key)?
                .into_iter()
                .next()
                .ok_or_else(|| CoreError::backup_not_found(format!("no backups of {}", self.name)))?,
        };
        let mut restored = backup::read(storage, &key, Timestamp::now())?;

        match self.load() {
            Ok(current) => self.snapshot_before(&current, true),
            Err(e) => warn!(table = %self.name, error = %e, "current table unreadable, restoring without snapshot"),
        }
        self.persist(&mut restored, "restore")?;

        self.shared.metrics.record_restore();
        info!(table = %self.name, key = %key, records = restored.len(), "table restored from backup");
        self.emit(StoreEvent::Restored {
            table: self.name.clone(),
            key,
        });
        Ok(restored.len())
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Rebuilds all indexes and writes the table back.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the table cannot be written.
    pub fn reindex(&self) -> CoreResult<()> {
        self.locked(|table| {
            table.reindex();
            self.persist(table, "reindex")
        })
    }

    /// Checks the stored blob without repairing it.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend cannot be read.
    pub fn verify(&self) -> CoreResult<VerifyReport> {
        let _guard = self.lock.lock();
        let mut report = VerifyReport {
            table: self.name.clone(),
            ..VerifyReport::default()
        };
        let Some(raw) = self.storage().get(&self.key)? else {
            report.issues.push("table has not been created".to_string());
            return Ok(report);
        };

        if let Ok(table) = serde_json::from_str::<Table>(&raw) {
            report.records = table.len();
            if table.meta.version != FORMAT_VERSION {
                report.issues.push(format!(
                    "format version {} is not {FORMAT_VERSION}",
                    table.meta.version
                ));
            }
            let mut seen = HashSet::new();
            for record in &table.data {
                if !seen.insert(record.id.as_str()) {
                    report.issues.push(format!("duplicate id {}", record.id));
                }
            }
            report.issues.extend(table.indexes.check(&table.data));
            return Ok(report);
        }

        match migration::decode(&raw, Timestamp::now()) {
            Decoded::Unusable(reason) => report.issues.push(format!("unusable: {reason}")),
            Decoded::Repaired {
                table,
                source,
                dropped,
            } => {
                report.records = table.len();
                report.issues.push(format!(
                    "stored shape needs repair ({}), {dropped} entries would be dropped",
                    describe(&source)
                ));
            }
            Decoded::Current(table) => report.records = table.len(),
        }
        Ok(report)
    }

    /// Returns metadata, counters and sizes of the table.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend cannot be read.
    pub fn info(&self) -> CoreResult<TableInfo> {
        self.locked(|table| {
            let bytes = self.storage().get(&self.key)?.map_or(0, |raw| raw.len());
            Ok(TableInfo {
                name: self.name.clone(),
                key: self.key.clone(),
                records: table.len(),
                bytes,
                backups: backup::keys(self.storage(), &self.key)?.len(),
                meta: table.meta.clone(),
                stats: table.stats.clone(),
            })
        })
    }

    // ------------------------------------------------------------------
    // Loading and persisting
    // ------------------------------------------------------------------

    fn storage(&self) -> &dyn KeyValueStore {
        self.shared.storage.as_ref()
    }

    fn emit(&self, event: StoreEvent) {
        self.shared.feed.emit(event);
    }

    /// Writes an empty envelope if the table does not exist yet, and
    /// repairs it if it does. Returns `true` if the table was created.
    pub(crate) fn initialize(&self) -> CoreResult<bool> {
        let _guard = self.lock.lock();
        if self.storage().get(&self.key)?.is_some() {
            let mut table = self.load()?;
            if self.schema.is_some() && table.meta.schema != self.schema {
                table.meta.schema.clone_from(&self.schema);
                self.persist(&mut table, "schema")?;
            }
            return Ok(false);
        }

        let mut table = self.empty_table(Timestamp::now());
        self.persist(&mut table, "init")?;
        info!(table = %self.name, key = %self.key, "table created");
        self.emit(StoreEvent::Created {
            table: self.name.clone(),
        });
        Ok(true)
    }

    fn locked<T>(&self, f: impl FnOnce(&mut Table) -> CoreResult<T>) -> CoreResult<T> {
        let _guard = self.lock.lock();
        let mut table = self.load()?;
        f(&mut table)
    }

    fn read(&self) -> Table {
        let _guard = self.lock.lock();
        self.shared.metrics.record_read();
        self.load().unwrap_or_else(|e| {
            warn!(table = %self.name, error = %e, "could not load table, answering from an empty one");
            self.empty_table(Timestamp::now())
        })
    }

    fn empty_table(&self, now: Timestamp) -> Table {
        let mut table = Table::empty(now);
        table.meta.schema.clone_from(&self.schema);
        table
    }

    /// Loads the table through the fallback levels. Must hold the lock.
    fn load(&self) -> CoreResult<Table> {
        let now = Timestamp::now();
        let Some(raw) = self.storage().get(&self.key)? else {
            return Ok(self.empty_table(now));
        };
        match migration::decode(&raw, now) {
            Decoded::Current(table) => Ok(table),
            Decoded::Repaired {
                table,
                source,
                dropped,
            } => Ok(self.repaired(table, source, dropped)),
            Decoded::Unusable(reason) => {
                warn!(table = %self.name, %reason, "stored table is unusable, trying backups");
                let (table, source) = self.latest_usable_backup(now)?;
                Ok(self.repaired(table, source, 0))
            }
        }
    }

    fn latest_usable_backup(&self, now: Timestamp) -> CoreResult<(Table, RecoverySource)> {
        for key in backup::keys(self.storage(), &self.key)? {
            match backup::read(self.storage(), &key, now) {
                Ok(table) => return Ok((table, RecoverySource::Backup(key))),
                Err(e) => warn!(table = %self.name, key = %key, error = %e, "skipping unreadable backup"),
            }
        }
        Ok((self.empty_table(now), RecoverySource::Empty))
    }

    /// Reports a repair and writes the repaired table back so it happens once.
    fn repaired(&self, mut table: Table, source: RecoverySource, dropped: usize) -> Table {
        self.shared.metrics.record_recovery();
        warn!(
            table = %self.name,
            source = %describe(&source),
            dropped,
            records = table.len(),
            "repaired stored table"
        );
        let operation = match source {
            RecoverySource::LegacyArray | RecoverySource::Salvaged => "migrate",
            RecoverySource::Reindexed => "reindex",
            RecoverySource::Backup(_) | RecoverySource::Empty => "recover",
        };
        self.emit(StoreEvent::Recovered {
            table: self.name.clone(),
            source,
            dropped,
        });
        if let Err(e) = self.persist(&mut table, operation) {
            warn!(table = %self.name, error = %e, "could not write back repaired table");
        }
        table
    }

    /// Serializes and writes the table, degrading it if it is too large.
    fn persist(&self, table: &mut Table, operation: &str) -> CoreResult<()> {
        self.persist_keeping(table, operation, None)
    }

    /// Like [`Self::persist`], but the record `keep` survives eviction.
    fn persist_keeping(&self, table: &mut Table, operation: &str, keep: Option<&str>) -> CoreResult<()> {
        table.stamp_operation(operation, Timestamp::now());
        let mut body = serde_json::to_string(&*table)?;
        if body.len() as u64 > self.shared.config.soft_limit_bytes {
            body = self.relieve_pressure(table, keep)?;
        }

        match self.storage().set(&self.key, &body) {
            Ok(()) => {}
            Err(e) if e.is_quota_exceeded() => {
                self.shared.metrics.record_quota_rejection();
                warn!(table = %self.name, bytes = body.len(), "write rejected by storage quota, dropping backups and retrying");
                self.prune_backups(0)?;
                if self.compact(table) > 0 {
                    body = serde_json::to_string(&*table)?;
                }
                self.storage()
                    .set(&self.key, &body)
                    .map_err(|e| self.storage_error(e))?;
            }
            Err(e) => return Err(e.into()),
        }

        self.shared.metrics.record_write(body.len() as u64);
        debug!(table = %self.name, operation, records = table.len(), bytes = body.len(), "table persisted");
        Ok(())
    }

    /// Applies compaction, snapshot pruning and eviction until the table
    /// fits under the soft limit. Returns the final serialization.
    ///
    /// The record `keep` is never evicted. If the table is still too large
    /// once only that record is left, nothing is pruned or written and the
    /// write fails with `StorageQuota`.
    fn relieve_pressure(&self, table: &mut Table, keep: Option<&str>) -> CoreResult<String> {
        let config = &self.shared.config;
        let limit = config.soft_limit_bytes;

        self.compact(table);
        let mut body = serde_json::to_string(&*table)?;
        if body.len() as u64 <= limit {
            return Ok(body);
        }

        let mut evicted = Vec::new();
        loop {
            let evictable = table.len() - usize::from(keep.is_some_and(|id| table.find(id).is_some()));
            if body.len() as u64 <= limit || evictable == 0 {
                break;
            }
            let batch = quota::eviction_batch(evictable, config.eviction_ratio);
            evicted.extend(quota::evict_oldest(table, batch, keep));
            table.stats.total_items = table.len();
            body = serde_json::to_string(&*table)?;
        }

        if body.len() as u64 > limit && !table.is_empty() {
            warn!(
                table = %self.name,
                bytes = body.len(),
                limit,
                "record does not fit under the soft size limit, write refused"
            );
            self.shared.metrics.record_quota_rejection();
            return Err(CoreError::StorageQuota {
                table: self.name.clone(),
                requested: body.len() as u64,
                limit,
            });
        }

        self.prune_backups(config.min_backups_under_pressure)?;
        if !evicted.is_empty() {
            self.shared.metrics.record_evictions(evicted.len() as u64);
            warn!(
                table = %self.name,
                evicted = evicted.len(),
                remaining = table.len(),
                "evicted oldest records over the soft size limit"
            );
            self.emit(StoreEvent::Evicted {
                table: self.name.clone(),
                ids: evicted,
            });
        }
        Ok(body)
    }

    fn compact(&self, table: &mut Table) -> usize {
        let fields_removed = quota::compact(table);
        if fields_removed > 0 {
            warn!(table = %self.name, fields_removed, "compacted empty fields");
            self.emit(StoreEvent::Compacted {
                table: self.name.clone(),
                fields_removed,
            });
        }
        fields_removed
    }

    fn prune_backups(&self, keep: usize) -> CoreResult<usize> {
        let removed = backup::prune(self.storage(), &self.key, keep)?;
        if removed > 0 {
            debug!(table = %self.name, removed, keep, "pruned backups");
            self.emit(StoreEvent::BackupsPruned {
                table: self.name.clone(),
                removed,
            });
        }
        Ok(removed)
    }

    fn storage_error(&self, error: StorageError) -> CoreError {
        match error {
            StorageError::QuotaExceeded {
                requested, limit, ..
            } => {
                self.shared.metrics.record_quota_rejection();
                CoreError::StorageQuota {
                    table: self.name.clone(),
                    requested,
                    limit,
                }
            }
            other => other.into(),
        }
    }

    /// Writes a snapshot and prunes beyond retention.
    fn snapshot(&self, table: &Table) -> CoreResult<String> {
        let storage = self.storage();
        let now = Timestamp::now();
        let key = match backup::write(storage, &self.key, table, now) {
            Ok(key) => key,
            Err(CoreError::Storage(e)) if e.is_quota_exceeded() => {
                warn!(table = %self.name, "backup rejected by storage quota, dropping older backups");
                self.prune_backups(0)?;
                backup::write(storage, &self.key, table, now).map_err(|e| match e {
                    CoreError::Storage(e) => self.storage_error(e),
                    other => other,
                })?
            }
            Err(e) => return Err(e),
        };

        self.shared.metrics.record_backup();
        info!(table = %self.name, key = %key, records = table.len(), "backup created");
        self.emit(StoreEvent::BackupCreated {
            table: self.name.clone(),
            key: key.clone(),
        });
        self.prune_backups(self.shared.config.backup_retention)?;
        Ok(key)
    }

    /// Takes an automatic snapshot if the backup policy asks for one.
    ///
    /// Failures are logged; they do not block the write that follows.
    fn snapshot_before(&self, table: &Table, destructive: bool) {
        let wanted = match self.shared.config.backup_policy {
            BackupPolicy::Never => false,
            BackupPolicy::Destructive => destructive,
            BackupPolicy::EveryWrite => true,
        };
        if !wanted || table.is_empty() {
            return;
        }
        if let Err(e) = self.snapshot(table) {
            warn!(table = %self.name, error = %e, "automatic backup failed");
        }
    }

    // ------------------------------------------------------------------
    // Record helpers
    // ------------------------------------------------------------------

    fn position(&self, table: &Table, id: &str) -> CoreResult<usize> {
        table
            .find(id)
            .map(|(position, _)| position)
            .ok_or_else(|| CoreError::not_found(&self.name, id))
    }

    fn validate(&self, table: &Table, fields: &Fields) -> CoreResult<()> {
        let Some(schema) = self.schema.as_ref().or(table.meta.schema.as_ref()) else {
            return Ok(());
        };
        let missing = schema.missing(fields);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoreError::validation(
                &self.name,
                format!("missing required fields: {}", missing.join(", ")),
            ))
        }
    }

    fn unique_id(&self, table: &Table) -> String {
        loop {
            let id = generate_id(&self.id_prefix);
            if !table.indexes.contains(&id) {
                return id;
            }
            debug!(table = %self.name, id = %id, "generated id already taken, regenerating");
        }
    }

    /// Appends a new record and indexes it.
    fn insert(&self, table: &mut Table, mut fields: Fields, id: Option<String>) -> Record {
        strip_system_fields(&mut fields);
        fields.remove(ID_FIELD);
        let id = id.unwrap_or_else(|| self.unique_id(table));
        let record = Record::new(id, fields, Timestamp::now());

        let position = table.data.len();
        table.indexes.insert(&record, position);
        table.data.push(record.clone());
        table.stats.last_insert_id = Some(record.id.clone());
        record
    }
}

/// Merges `patch` onto the record at `position` and re-points `byStatus`.
fn apply_update(table: &mut Table, position: usize, patch: Fields) -> Record {
    let record = &mut table.data[position];
    let old_status: Vec<String> = record.status_keys().into_iter().map(str::to_string).collect();
    record.merge(patch);
    record.touch();
    let updated = record.clone();

    let old_status: Vec<&str> = old_status.iter().map(String::as_str).collect();
    table
        .indexes
        .change_status(position, &old_status, &updated.status_keys());
    updated
}

/// The usable id carried by a payload, if any.
fn supplied_id(fields: &Fields) -> Option<String> {
    match fields.get(ID_FIELD)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn reject(report: &mut ImportReport, message: String) {
    report.skipped += 1;
    report.errors.push(message);
}

fn describe(source: &RecoverySource) -> String {
    match source {
        RecoverySource::Reindexed => "indexes rebuilt".to_string(),
        RecoverySource::Salvaged => "envelope salvaged".to_string(),
        RecoverySource::LegacyArray => "legacy array migrated".to_string(),
        RecoverySource::Backup(key) => format!("restored from {key}"),
        RecoverySource::Empty => "replaced with an empty table".to_string(),
    }
}
