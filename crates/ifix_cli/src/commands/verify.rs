//! Verify and reindex commands.

use ifix_core::{Database, VerifyReport};
use tracing::info;

/// Checks `table`, or every stored table, without repairing anything.
pub fn check(
    db: &Database,
    table: Option<&str>,
) -> Result<Vec<VerifyReport>, Box<dyn std::error::Error>> {
    let names = match table {
        Some(name) => vec![name.to_string()],
        None => db.table_names()?,
    };
    names
        .iter()
        .map(|name| db.verify_table(name).map_err(Into::into))
        .collect()
}

/// Runs the verify command.
pub fn run(db: &Database, table: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let reports = check(db, table)?;
    if reports.is_empty() {
        println!("No tables to verify");
        return Ok(());
    }

    for report in &reports {
        print_result(report);
    }

    println!();
    let failed = reports.iter().filter(|r| !r.is_ok()).count();
    if failed == 0 {
        println!("✓ Verification passed");
        Ok(())
    } else {
        println!("✗ Verification failed for {failed} table(s)");
        println!("  Opening a damaged table repairs it; run `reindex` or any read to do so.");
        Err("Verification failed".into())
    }
}

fn print_result(report: &VerifyReport) {
    let mark = if report.is_ok() { "✓" } else { "✗" };
    println!("{mark} {}: {} records", report.table, report.records);
    for issue in &report.issues {
        println!("    ERROR: {issue}");
    }
}

/// Runs the reindex command.
pub fn reindex(db: &Database, table: &str) -> Result<(), Box<dyn std::error::Error>> {
    info!(table, "rebuilding indexes");
    let store = db.table(table)?;
    store.reindex()?;
    println!("✓ Rebuilt indexes of {table} ({} records)", store.count());
    Ok(())
}
