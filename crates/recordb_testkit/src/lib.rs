//! # RecorDB Testkit
//!
//! Test utilities for RecorDB.
//!
//! This crate provides:
//! - Test fixtures and database helpers
//! - Property-based test generators using proptest
//! - A crash harness that cuts the WAL at every byte and checks recovery
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use recordb_testkit::prelude::*;
//!
//! with_temp_db(|conn| {
//!     assert_eq!(conn.collection_names(), vec![TASKS]);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
