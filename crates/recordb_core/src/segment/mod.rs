//! Segment storage for committed records.
//!
//! Segments are an append-only log of record versions. An in-memory ordered
//! index maps `(collection, key)` to the newest live version and is rebuilt
//! from the log on open.
//!
//! ## Record Format
//!
//! ```text
//! | len (4) | collection_id (4) | flags (1) | sequence (8) | key_len (4) | key | payload | crc32 (4) |
//! ```

mod record;
mod store;

pub use record::{SegmentRecord, SegmentRecordFlags};
pub use store::SegmentManager;
