//! Inspect command implementation.

use super::format_size;
use ifix_core::{Database, TableInfo};
use serde::Serialize;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResult {
    /// Data directory.
    pub path: String,
    /// Storage key prefix.
    pub prefix: String,
    /// Bytes held by the backend, snapshots included.
    pub used_bytes: u64,
    /// Backend size limit, if any.
    pub quota: Option<u64>,
    /// One entry per table.
    pub tables: Vec<TableInfo>,
}

/// Collects the inspection result.
///
/// Opening a table repairs it if its stored shape is damaged.
pub fn collect(db: &Database, path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let mut tables = Vec::new();
    for name in db.table_names()? {
        tables.push(db.table(&name)?.info()?);
    }
    Ok(InspectResult {
        path: path.display().to_string(),
        prefix: db.config().key_prefix.clone(),
        used_bytes: db.storage().used_bytes()?,
        quota: db.storage().quota(),
        tables,
    })
}

/// Runs the inspect command.
pub fn run(db: &Database, path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = collect(db, path)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("IFIX Store Inspection");
    println!("=====================");
    println!();
    println!("Path:   {}", result.path);
    println!("Prefix: {}", result.prefix);
    match result.quota {
        Some(quota) => println!(
            "Used:   {} of {}",
            format_size(result.used_bytes),
            format_size(quota)
        ),
        None => println!("Used:   {}", format_size(result.used_bytes)),
    }
    println!();

    if result.tables.is_empty() {
        println!("No tables.");
        return;
    }
    println!("Tables:");
    for table in &result.tables {
        println!(
            "  {} ({}): {} records, {}, {} snapshots",
            table.name,
            table.key,
            table.records,
            format_size(table.bytes as u64),
            table.backups
        );
        println!(
            "    format {}, created {}, modified {}",
            table.meta.version, table.meta.created, table.meta.last_modified
        );
        if let Some(from) = &table.meta.migrated_from {
            println!("    migrated from {from}");
        }
        if let Some(op) = &table.stats.last_operation {
            println!(
                "    last operation: {op} ({} total)",
                table.stats.operation_count
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifix_core::fields;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn collects_every_table() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let notes = db.table("NOTES").unwrap();
        notes.create(fields(json!({"text": "a"}))).unwrap();
        notes.create_backup().unwrap();
        db.table("OTHER").unwrap();

        let result = collect(&db, dir.path()).unwrap();
        assert_eq!(result.prefix, "IFIX");
        let names: Vec<_> = result.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["NOTES", "OTHER"]);
        assert_eq!(result.tables[0].records, 1);
        assert_eq!(result.tables[0].backups, 1);
        assert!(result.used_bytes > 0);
    }
}
