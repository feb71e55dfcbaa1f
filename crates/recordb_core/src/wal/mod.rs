//! Write-ahead log.
//!
//! Every commit is written to the WAL and flushed before it is applied to the
//! segments or acknowledged. On open, the WAL is replayed and only
//! transactions with a `Commit` record are applied.
//!
//! ## Frame Format
//!
//! ```text
//! | magic (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! ## Recovery Policy
//!
//! - A truncated header or payload at the tail is a crash mid-write: the scan
//!   stops there and the torn bytes are cut off.
//! - A CRC mismatch, bad magic, unknown type or future version is corruption
//!   and fails the open.

mod record;
mod writer;

pub use record::{WalRecord, WalRecordType};
pub use writer::{WalManager, WalScan};
