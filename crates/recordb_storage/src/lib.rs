//! # RecorDB Storage
//!
//! Byte-store backends underneath the RecorDB engine.
//!
//! A backend is an **opaque, append-only byte store**. It knows nothing about
//! records, collections, WAL frames or segments; the engine in `recordb_core`
//! owns every on-disk format and only asks a backend to read, append, flush
//! and truncate bytes.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - volatile store, optionally capped by a byte quota
//! - [`FileBackend`] - persistent store on top of a single OS file
//! - [`FaultyBackend`] - wrapper that injects failures, for exercising error paths
//!
//! ## Example
//!
//! ```rust
//! use recordb_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"record bytes").unwrap();
//! assert_eq!(backend.read_at(offset, 6).unwrap(), b"record");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod faulty;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use faulty::{FaultSwitch, FaultyBackend};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
