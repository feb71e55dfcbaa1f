//! Inspect command implementation.

use super::connect;
use crate::error::CliResult;
use recordb_core::{DatabaseInfo, Factory, KeyRange, TransactionMode};
use serde::Serialize;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database name.
    pub name: String,
    /// Database directory.
    pub path: String,
    /// Stored version.
    pub version: u64,
    /// WAL size in bytes.
    pub wal_size: u64,
    /// Segment log size in bytes.
    pub segment_size: u64,
    /// Sequence number of the latest commit.
    pub committed_seq: u64,
    /// Sequence number of the last checkpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checkpoint: Option<u64>,
    /// Per-collection statistics.
    pub collections: Vec<CollectionStats>,
}

/// Statistics for a single collection.
#[derive(Debug, Serialize)]
pub struct CollectionStats {
    /// Collection name.
    pub name: String,
    /// Collection ID.
    pub id: u32,
    /// Key path of the primary key.
    pub key_path: String,
    /// Number of live records.
    pub record_count: usize,
}

#[derive(Serialize)]
struct Listing<'a> {
    name: &'a str,
    version: u64,
}

/// Runs the inspect command.
pub fn run(root: &Path, database: Option<&str>, format: &str) -> CliResult<()> {
    let Some(name) = database else {
        let databases = Factory::on_disk(root).databases()?;
        return list(&databases, format);
    };

    let (_factory, conn) = connect(root, name)?;
    let db = conn.database();
    let manifest = db.manifest();
    let (wal_size, segment_size) = db.storage_size()?;

    let names: Vec<&String> = manifest.collections.keys().collect();
    let mut collections = Vec::with_capacity(names.len());
    if !names.is_empty() {
        let mut txn = conn.transaction(&names, TransactionMode::ReadOnly)?;
        for (collection, meta) in &manifest.collections {
            collections.push(CollectionStats {
                name: collection.clone(),
                id: meta.id.0,
                key_path: meta.key_path.to_string(),
                record_count: txn.count(collection, &KeyRange::all())?,
            });
        }
    }

    let result = InspectResult {
        name: name.to_string(),
        path: root.join(name).display().to_string(),
        version: manifest.user_version,
        wal_size,
        segment_size,
        committed_seq: db.committed_seq().0,
        last_checkpoint: manifest.last_checkpoint.map(|seq| seq.0),
        collections,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn list(databases: &[DatabaseInfo], format: &str) -> CliResult<()> {
    match format {
        "json" => {
            let listing: Vec<Listing<'_>> = databases
                .iter()
                .map(|info| Listing {
                    name: &info.name,
                    version: info.version,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        _ => {
            if databases.is_empty() {
                println!("No databases.");
            }
            for info in databases {
                println!("{} (v{})", info.name, info.version);
            }
        }
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("RecorDB Database Inspection");
    println!("===========================");
    println!();
    println!("Name:    {}", result.name);
    println!("Path:    {}", result.path);
    println!("Version: {}", result.version);
    println!();
    println!("Storage:");
    println!("  WAL size:      {}", format_size(result.wal_size));
    println!("  Segment size:  {}", format_size(result.segment_size));
    println!("  Committed seq: {}", result.committed_seq);
    match result.last_checkpoint {
        Some(seq) => println!("  Checkpoint:    {seq}"),
        None => println!("  Checkpoint:    none"),
    }
    println!();
    println!("Collections:");
    if result.collections.is_empty() {
        println!("  (none)");
    }
    for col in &result.collections {
        println!(
            "  [{}] {} keyed by {:?}: {} records",
            col.id, col.name, col.key_path, col.record_count
        );
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
