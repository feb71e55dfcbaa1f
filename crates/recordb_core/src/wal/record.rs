//! WAL record types and serialization.

use crate::error::{CoreError, CoreResult};
use crate::key::Key;
use crate::types::{CollectionId, SequenceNumber, TransactionId};
use crate::wire::{put_bytes, ByteReader};

/// Magic bytes identifying a WAL frame.
pub const WAL_MAGIC: [u8; 4] = *b"RWAL";

/// Current WAL format version.
pub const WAL_VERSION: u16 = 1;

/// Type of WAL record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalRecordType {
    /// Begin a new transaction.
    Begin = 1,
    /// Insert or overwrite a record.
    Put = 2,
    /// Delete a record.
    Delete = 3,
    /// Commit a transaction.
    Commit = 4,
    /// Abort a transaction.
    Abort = 5,
    /// Checkpoint marker.
    Checkpoint = 6,
}

impl WalRecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Begin),
            2 => Some(Self::Put),
            3 => Some(Self::Delete),
            4 => Some(Self::Commit),
            5 => Some(Self::Abort),
            6 => Some(Self::Checkpoint),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A logged operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// Begin a new transaction.
    Begin {
        /// Transaction ID.
        txid: TransactionId,
    },

    /// Insert or overwrite a record.
    Put {
        /// Transaction ID.
        txid: TransactionId,
        /// Collection holding the record.
        collection_id: CollectionId,
        /// Primary key.
        key: Key,
        /// Encoded record (canonical CBOR).
        payload: Vec<u8>,
    },

    /// Delete a record.
    Delete {
        /// Transaction ID.
        txid: TransactionId,
        /// Collection holding the record.
        collection_id: CollectionId,
        /// Primary key.
        key: Key,
    },

    /// Commit a transaction.
    Commit {
        /// Transaction ID.
        txid: TransactionId,
        /// Sequence number assigned to this commit.
        sequence: SequenceNumber,
    },

    /// Abort a transaction.
    Abort {
        /// Transaction ID.
        txid: TransactionId,
    },

    /// Everything up to `sequence` is in the segments.
    Checkpoint {
        /// Sequence number at checkpoint.
        sequence: SequenceNumber,
    },
}

impl WalRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> WalRecordType {
        match self {
            Self::Begin { .. } => WalRecordType::Begin,
            Self::Put { .. } => WalRecordType::Put,
            Self::Delete { .. } => WalRecordType::Delete,
            Self::Commit { .. } => WalRecordType::Commit,
            Self::Abort { .. } => WalRecordType::Abort,
            Self::Checkpoint { .. } => WalRecordType::Checkpoint,
        }
    }

    /// Returns the transaction ID if this record is associated with one.
    #[must_use]
    pub fn txid(&self) -> Option<TransactionId> {
        match self {
            Self::Begin { txid }
            | Self::Put { txid, .. }
            | Self::Delete { txid, .. }
            | Self::Commit { txid, .. }
            | Self::Abort { txid } => Some(*txid),
            Self::Checkpoint { .. } => None,
        }
    }

    /// Serializes the record payload (without the frame).
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();

        match self {
            Self::Begin { txid } | Self::Abort { txid } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
            }
            Self::Put {
                txid,
                collection_id,
                key,
                payload,
            } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                buf.extend_from_slice(&collection_id.as_u32().to_le_bytes());
                put_bytes(&mut buf, &key.encode()?)?;
                put_bytes(&mut buf, payload)?;
            }
            Self::Delete {
                txid,
                collection_id,
                key,
            } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                buf.extend_from_slice(&collection_id.as_u32().to_le_bytes());
                put_bytes(&mut buf, &key.encode()?)?;
            }
            Self::Commit { txid, sequence } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                buf.extend_from_slice(&sequence.as_u64().to_le_bytes());
            }
            Self::Checkpoint { sequence } => {
                buf.extend_from_slice(&sequence.as_u64().to_le_bytes());
            }
        }

        Ok(buf)
    }

    /// Deserializes a record from its type and payload.
    pub fn decode_payload(record_type: WalRecordType, payload: &[u8]) -> CoreResult<Self> {
        let mut reader = ByteReader::new(payload, CoreError::wal_corruption);
        let read_key = |reader: &mut ByteReader<'_>| -> CoreResult<Key> {
            Key::decode(reader.bytes()?)
                .map_err(|e| CoreError::wal_corruption(format!("bad key: {e}")))
        };

        let record = match record_type {
            WalRecordType::Begin => Self::Begin {
                txid: TransactionId::new(reader.u64()?),
            },
            WalRecordType::Put => Self::Put {
                txid: TransactionId::new(reader.u64()?),
                collection_id: CollectionId::new(reader.u32()?),
                key: read_key(&mut reader)?,
                payload: reader.bytes()?.to_vec(),
            },
            WalRecordType::Delete => Self::Delete {
                txid: TransactionId::new(reader.u64()?),
                collection_id: CollectionId::new(reader.u32()?),
                key: read_key(&mut reader)?,
            },
            WalRecordType::Commit => Self::Commit {
                txid: TransactionId::new(reader.u64()?),
                sequence: SequenceNumber::new(reader.u64()?),
            },
            WalRecordType::Abort => Self::Abort {
                txid: TransactionId::new(reader.u64()?),
            },
            WalRecordType::Checkpoint => Self::Checkpoint {
                sequence: SequenceNumber::new(reader.u64()?),
            },
        };

        reader.finish()?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_type_bytes() {
        for t in [
            WalRecordType::Begin,
            WalRecordType::Put,
            WalRecordType::Delete,
            WalRecordType::Commit,
            WalRecordType::Abort,
            WalRecordType::Checkpoint,
        ] {
            assert_eq!(WalRecordType::from_byte(t.as_byte()), Some(t));
        }
        assert_eq!(WalRecordType::from_byte(0), None);
        assert_eq!(WalRecordType::from_byte(7), None);
    }

    #[test]
    fn put_carries_typed_key() {
        let record = WalRecord::Put {
            txid: TransactionId::new(1),
            collection_id: CollectionId::new(5),
            key: Key::Array(vec![Key::from("tarea"), Key::Integer(1)]),
            payload: vec![0xA1, 0x61, b'x', 0x01],
        };
        let payload = record.encode_payload().unwrap();
        let decoded = WalRecord::decode_payload(WalRecordType::Put, &payload).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.txid(), Some(TransactionId::new(1)));
    }

    #[test]
    fn trailing_bytes_are_corruption() {
        let mut payload = WalRecord::Begin {
            txid: TransactionId::new(42),
        }
        .encode_payload()
        .unwrap();
        payload.push(0);
        assert!(matches!(
            WalRecord::decode_payload(WalRecordType::Begin, &payload),
            Err(CoreError::WalCorruption { .. })
        ));
    }

    #[test]
    fn short_payload_is_corruption() {
        let payload = WalRecord::Commit {
            txid: TransactionId::new(7),
            sequence: SequenceNumber::new(100),
        }
        .encode_payload()
        .unwrap();
        assert!(WalRecord::decode_payload(WalRecordType::Commit, &payload[..12]).is_err());
    }

    #[test]
    fn invalid_key_bytes_are_corruption() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&1u64.to_le_bytes());
        payload.extend_from_slice(&1u32.to_le_bytes());
        // A key that decodes to null.
        put_bytes(&mut payload, &[0xf6]).unwrap();
        assert!(matches!(
            WalRecord::decode_payload(WalRecordType::Delete, &payload),
            Err(CoreError::WalCorruption { .. })
        ));
    }

    #[test]
    fn checkpoint_has_no_transaction() {
        let record = WalRecord::Checkpoint {
            sequence: SequenceNumber::new(500),
        };
        assert_eq!(record.txid(), None);
        assert_eq!(record.record_type(), WalRecordType::Checkpoint);
    }
}
