//! Export and import commands.

use ifix_core::{Database, Format, ImportOptions};
use std::fs;
use std::path::Path;
use tracing::info;

/// Exports a table to `output`, or stdout.
pub fn export(
    db: &Database,
    table: &str,
    format: Format,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = db.table(table)?;
    let text = store.export(format)?;
    match output {
        Some(path) => {
            fs::write(path, &text)?;
            info!(table, %format, path = %path.display(), "exported");
            println!("✓ Exported {} records to {}", store.count(), path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

/// Imports `file` into a table.
pub fn import(
    db: &Database,
    table: &str,
    file: &Path,
    format: Option<Format>,
    clear: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let format = match format {
        Some(format) => format,
        None => guess_format(file)?,
    };
    let text = fs::read_to_string(file)?;
    let report = db
        .table(table)?
        .import(&text, ImportOptions::new(format).clear_before_import(clear))?;

    println!("✓ Import finished");
    println!("  Imported: {}", report.imported);
    println!("  Merged:   {}", report.merged);
    println!("  Skipped:  {}", report.skipped);
    for error in &report.errors {
        println!("    ERROR: {error}");
    }
    Ok(())
}

fn guess_format(file: &Path) -> Result<Format, Box<dyn std::error::Error>> {
    let ext = file
        .extension()
        .and_then(|e| e.to_str())
        .ok_or("Cannot guess the format without a file extension; use --format")?;
    Ok(ext.parse()?)
}
