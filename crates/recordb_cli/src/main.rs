//! RecorDB CLI
//!
//! Command-line tools for RecorDB databases stored under a root directory.
//!
//! # Commands
//!
//! - `inspect` - List databases, or show one database's storage and collections
//! - `scan` / `get` - Read records
//! - `put` / `add` / `delete` - Write records, one transaction per command
//! - `upgrade` - Raise a database's version, creating or dropping collections
//! - `checkpoint` - Fold the WAL into the segment log
//! - `drop` - Delete a database

mod commands;
mod error;
mod json;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// RecorDB command-line database tools.
#[derive(Parser)]
#[command(name = "recordb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the databases
    #[arg(global = true, short, long, default_value = ".")]
    root: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List databases, or describe one
    Inspect {
        /// Database to describe
        database: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the records of a collection in key order
    Scan {
        /// Database name
        database: String,
        /// Collection name
        collection: String,

        /// Walk in descending key order
        #[arg(long)]
        reverse: bool,

        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print one record
    Get {
        /// Database name
        database: String,
        /// Collection name
        collection: String,
        /// Key (integer or text)
        key: String,
    },

    /// Insert or replace a record given as a JSON object
    Put {
        /// Database name
        database: String,
        /// Collection name
        collection: String,
        /// Record as JSON
        record: String,
    },

    /// Insert a record given as a JSON object; fails if the key exists
    Add {
        /// Database name
        database: String,
        /// Collection name
        collection: String,
        /// Record as JSON
        record: String,
    },

    /// Delete one record
    Delete {
        /// Database name
        database: String,
        /// Collection name
        collection: String,
        /// Key (integer or text)
        key: String,
    },

    /// Open a database at a higher version
    Upgrade {
        /// Database name
        database: String,

        /// Target version
        #[arg(long = "to")]
        version: u64,

        /// Collection to create, as NAME:KEY_PATH
        #[arg(long = "create", value_name = "NAME:KEY_PATH")]
        create: Vec<String>,

        /// Collection to delete
        #[arg(long = "drop", value_name = "NAME")]
        drop: Vec<String>,
    },

    /// Fold the WAL into the segment log
    Checkpoint {
        /// Database name
        database: String,
    },

    /// Delete a database and all of its data
    Drop {
        /// Database name
        database: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let root = cli.root;
    match cli.command {
        Commands::Inspect { database, format } => {
            commands::inspect::run(&root, database.as_deref(), &format)?;
        }
        Commands::Scan {
            database,
            collection,
            reverse,
            limit,
        } => {
            commands::records::scan(&root, &database, &collection, reverse, limit)?;
        }
        Commands::Get {
            database,
            collection,
            key,
        } => {
            commands::records::get(&root, &database, &collection, &key)?;
        }
        Commands::Put {
            database,
            collection,
            record,
        } => {
            commands::records::put(&root, &database, &collection, &record)?;
        }
        Commands::Add {
            database,
            collection,
            record,
        } => {
            commands::records::add(&root, &database, &collection, &record)?;
        }
        Commands::Delete {
            database,
            collection,
            key,
        } => {
            commands::records::delete(&root, &database, &collection, &key)?;
        }
        Commands::Upgrade {
            database,
            version,
            create,
            drop,
        } => {
            commands::admin::upgrade(&root, &database, version, &create, &drop)?;
        }
        Commands::Checkpoint { database } => {
            commands::admin::checkpoint(&root, &database)?;
        }
        Commands::Drop { database } => {
            commands::admin::drop_database(&root, &database)?;
        }
        Commands::Version => {
            println!("RecorDB CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
