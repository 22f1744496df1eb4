//! Backup and restore commands.
//!
//! Snapshots live next to their table in the same data directory, keyed by
//! the table key, `_backup_` and the creation time in milliseconds.

use super::{format_millis, format_size};
use ifix_core::Database;
use tracing::info;

/// Snapshots a table.
pub fn create(db: &Database, table: &str) -> Result<(), Box<dyn std::error::Error>> {
    info!(table, "creating snapshot");
    let store = db.table(table)?;
    let key = store.create_backup()?;

    println!("✓ Backup created successfully");
    println!("  Key: {key}");
    println!("  Records: {}", store.count());
    Ok(())
}

/// Lists the snapshots of a table, newest first.
pub fn list(db: &Database, table: &str) -> Result<(), Box<dyn std::error::Error>> {
    let backups = db.table(table)?.list_backups()?;
    if backups.is_empty() {
        println!("No backups for {table}");
        return Ok(());
    }

    println!("Backups of {table}");
    println!("==================");
    for backup in backups {
        let records = backup
            .record_count
            .map_or_else(|| "unreadable".to_string(), |n| format!("{n} records"));
        println!(
            "  {}  {}  {}  {}",
            backup.key,
            format_millis(backup.created_millis),
            records,
            format_size(backup.bytes as u64)
        );
    }
    Ok(())
}

/// Replaces a table with a snapshot, the newest one if `key` is `None`.
pub fn restore(
    db: &Database,
    table: &str,
    key: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(table, key = key.unwrap_or("newest"), "restoring snapshot");
    let restored = db.table(table)?.restore_from_backup(key)?;

    println!("✓ Table restored successfully");
    println!("  Table: {table}");
    println!("  Records restored: {restored}");
    Ok(())
}
