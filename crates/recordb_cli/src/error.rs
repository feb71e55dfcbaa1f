//! CLI error types.

use recordb_core::CoreError;
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The engine rejected the operation.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The argument was not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A record must be a JSON object.
    #[error("record must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// Floats have no canonical encoding and cannot be stored.
    #[error("{path}: floating-point numbers are not supported")]
    Float {
        /// Where the float was found.
        path: String,
    },

    /// An integer outside the signed 64-bit range.
    #[error("{path}: integer out of range")]
    OutOfRange {
        /// Where the integer was found.
        path: String,
    },

    /// No database with this name exists under the root.
    #[error("no database named {0:?}")]
    NoSuchDatabase(String),

    /// A `--create` argument was not `NAME:KEY_PATH`.
    #[error("expected NAME:KEY_PATH, got {0:?}")]
    CollectionSpec(String),

    /// `upgrade --to` was not above the stored version.
    #[error("database {name:?} is already at version {stored}")]
    NotNewer {
        /// Database name.
        name: String,
        /// Stored version.
        stored: u64,
    },

    /// `get` found nothing.
    #[error("no record with key {0}")]
    NotFound(String),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;
