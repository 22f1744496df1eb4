//! IFIX CLI
//!
//! Maintenance tools for an IFIX record store kept in a directory.
//!
//! # Commands
//!
//! - `inspect` - Display tables, sizes, metadata and snapshots
//! - `verify` - Check stored tables without repairing them
//! - `reindex` - Rebuild the indexes of a table
//! - `backup` - Create, list and restore table snapshots
//! - `export` / `import` - Move records in and out as JSON or CSV

mod commands;

use clap::{Parser, Subcommand};
use ifix_core::{Config, Database, Format};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// IFIX command-line maintenance tools.
#[derive(Parser)]
#[command(name = "ifix")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long)]
    dir: Option<PathBuf>,

    /// Storage key prefix
    #[arg(global = true, long, default_value = "IFIX")]
    prefix: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display tables, sizes, metadata and snapshots
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check stored tables without repairing them
    Verify {
        /// Only check this table
        table: Option<String>,
    },

    /// Rebuild the indexes of a table
    Reindex {
        /// Table name
        table: String,
    },

    /// Manage table snapshots
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Export a table
    Export {
        /// Table name
        table: String,

        /// Output format (json, csv)
        #[arg(short, long, default_value = "json")]
        format: Format,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import records into a table
    Import {
        /// Table name
        table: String,

        /// File to read
        file: PathBuf,

        /// Input format (json, csv); guessed from the extension if omitted
        #[arg(short, long)]
        format: Option<Format>,

        /// Empty the table first
        #[arg(long)]
        clear: bool,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum BackupAction {
    /// Snapshot a table
    Create {
        /// Table name
        table: String,
    },
    /// List the snapshots of a table, newest first
    List {
        /// Table name
        table: String,
    },
    /// Replace a table with a snapshot
    Restore {
        /// Table name
        table: String,

        /// Snapshot key; the newest snapshot if omitted
        #[arg(short, long)]
        key: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("IFIX CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("IFIX Core v{}", ifix_core::VERSION);
        return Ok(());
    }

    let dir = cli.dir.ok_or("Data directory required (--dir)")?;
    let db = Database::open_with_config(&dir, Config::new().key_prefix(cli.prefix))?;

    match cli.command {
        Commands::Inspect { format } => commands::inspect::run(&db, &dir, &format)?,
        Commands::Verify { table } => commands::verify::run(&db, table.as_deref())?,
        Commands::Reindex { table } => commands::verify::reindex(&db, &table)?,
        Commands::Backup { action } => match action {
            BackupAction::Create { table } => commands::backup::create(&db, &table)?,
            BackupAction::List { table } => commands::backup::list(&db, &table)?,
            BackupAction::Restore { table, key } => {
                commands::backup::restore(&db, &table, key.as_deref())?;
            }
        },
        Commands::Export {
            table,
            format,
            output,
        } => commands::transfer::export(&db, &table, format, output.as_deref())?,
        Commands::Import {
            table,
            file,
            format,
            clear,
        } => commands::transfer::import(&db, &table, &file, format, clear)?,
        Commands::Version => {}
    }

    Ok(())
}
