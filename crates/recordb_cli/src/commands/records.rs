//! Record commands: scan, get, put, add, delete.

use super::connect;
use crate::error::{CliError, CliResult};
use crate::json::{parse_key, parse_record, record_to_json};
use recordb_core::{Direction, KeyRange, TransactionMode};
use std::path::Path;
use tracing::info;

/// Prints every record of a collection, one JSON object per line.
pub fn scan(
    root: &Path,
    database: &str,
    collection: &str,
    reverse: bool,
    limit: Option<usize>,
) -> CliResult<()> {
    let (_factory, conn) = connect(root, database)?;
    let mut txn = conn.transaction(&[collection], TransactionMode::ReadOnly)?;
    let direction = if reverse {
        Direction::Prev
    } else {
        Direction::Next
    };

    let cursor = txn.open_cursor(collection, KeyRange::all(), direction)?;
    for record in cursor.take(limit.unwrap_or(usize::MAX)) {
        println!("{}", record_to_json(&record?));
    }
    txn.commit()?;
    Ok(())
}

/// Prints one record as pretty JSON.
pub fn get(root: &Path, database: &str, collection: &str, key: &str) -> CliResult<()> {
    let (_factory, conn) = connect(root, database)?;
    let mut txn = conn.transaction(&[collection], TransactionMode::ReadOnly)?;
    let record = txn
        .get(collection, &parse_key(key))?
        .ok_or_else(|| CliError::NotFound(key.to_string()))?;
    println!("{}", serde_json::to_string_pretty(&record_to_json(&record))?);
    Ok(())
}

/// Inserts or replaces a record.
pub fn put(root: &Path, database: &str, collection: &str, json: &str) -> CliResult<()> {
    let record = parse_record(json)?;
    let (_factory, conn) = connect(root, database)?;
    let mut txn = conn.transaction(&[collection], TransactionMode::ReadWrite)?;
    let key = txn.put(collection, &record)?;
    let sequence = txn.commit()?;
    info!(%key, %sequence, "record stored");
    println!("{key}");
    Ok(())
}

/// Inserts a record whose key must be new.
pub fn add(root: &Path, database: &str, collection: &str, json: &str) -> CliResult<()> {
    let record = parse_record(json)?;
    let (_factory, conn) = connect(root, database)?;
    let mut txn = conn.transaction(&[collection], TransactionMode::ReadWrite)?;
    let added = txn.add(collection, &record);
    let sequence = txn.commit()?;
    let key = added?;
    info!(%key, %sequence, "record added");
    println!("{key}");
    Ok(())
}

/// Deletes one record; deleting an absent key succeeds.
pub fn delete(root: &Path, database: &str, collection: &str, key: &str) -> CliResult<()> {
    let (_factory, conn) = connect(root, database)?;
    let mut txn = conn.transaction(&[collection], TransactionMode::ReadWrite)?;
    txn.delete(collection, &parse_key(key))?;
    txn.commit()?;
    Ok(())
}
