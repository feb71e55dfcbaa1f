//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The CBOR writer failed.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// What the writer reported.
        message: String,
    },

    /// The input is not well-formed CBOR.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// What the reader reported.
        message: String,
    },

    /// Floats have no canonical form and are not stored.
    #[error("float values are forbidden in canonical CBOR")]
    FloatForbidden,

    /// Tagged items are not part of the value model.
    #[error("CBOR tag {tag} is not supported")]
    TagForbidden {
        /// The rejected tag number.
        tag: u64,
    },

    /// An integer does not fit in `i64`.
    #[error("integer overflow")]
    IntegerOverflow,

    /// Map keys are out of canonical order or repeated.
    #[error("non-canonical map: {message}")]
    NonCanonicalMap {
        /// Which rule was broken.
        message: String,
    },

    /// Bytes remain after the first complete item.
    #[error("{count} trailing bytes after value")]
    TrailingBytes {
        /// Number of unread bytes.
        count: usize,
    },
}

impl CodecError {
    /// Creates an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Creates a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Creates a non-canonical map error.
    pub fn non_canonical_map(message: impl Into<String>) -> Self {
        Self::NonCanonicalMap {
            message: message.into(),
        }
    }
}
