//! Segment record types.

use crate::error::{CoreError, CoreResult};
use crate::key::Key;
use crate::types::{CollectionId, SequenceNumber};
use crate::wire::{compute_crc32, put_bytes, ByteReader};

/// Flags for segment records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentRecordFlags(u8);

impl SegmentRecordFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Record is a tombstone (record deleted).
    pub const TOMBSTONE: Self = Self(0x01);

    /// Creates new flags from raw byte.
    #[must_use]
    pub const fn from_byte(b: u8) -> Self {
        Self(b)
    }

    /// Returns the raw byte value.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self.0
    }

    /// Checks if tombstone flag is set.
    #[must_use]
    pub const fn is_tombstone(self) -> bool {
        self.0 & 0x01 != 0
    }
}

/// One version of a record in the segment log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRecord {
    /// Collection this record belongs to.
    pub collection_id: CollectionId,
    /// Primary key.
    pub key: Key,
    /// Record flags.
    pub flags: SegmentRecordFlags,
    /// Encoded record, empty for a tombstone.
    pub payload: Vec<u8>,
    /// Sequence number of the commit that wrote this version.
    pub sequence: SequenceNumber,
}

impl SegmentRecord {
    /// len (4) + collection_id (4) + flags (1) + sequence (8)
    pub(crate) const FIXED_SIZE: usize = 17;
    const CRC_SIZE: usize = 4;

    /// Creates a new put record.
    #[must_use]
    pub fn put(
        collection_id: CollectionId,
        key: Key,
        payload: Vec<u8>,
        sequence: SequenceNumber,
    ) -> Self {
        Self {
            collection_id,
            key,
            flags: SegmentRecordFlags::NONE,
            payload,
            sequence,
        }
    }

    /// Creates a tombstone record.
    #[must_use]
    pub fn tombstone(collection_id: CollectionId, key: Key, sequence: SequenceNumber) -> Self {
        Self {
            collection_id,
            key,
            flags: SegmentRecordFlags::TOMBSTONE,
            payload: Vec::new(),
            sequence,
        }
    }

    /// Returns whether this is a tombstone.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.flags.is_tombstone()
    }

    /// Size of the encoded record in bytes.
    pub fn encoded_len(&self) -> CoreResult<usize> {
        Ok(Self::FIXED_SIZE + 4 + self.key.encode()?.len() + self.payload.len() + Self::CRC_SIZE)
    }

    /// Encodes the record to bytes.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let key = self.key.encode()?;
        let total = Self::FIXED_SIZE + 4 + key.len() + self.payload.len() + Self::CRC_SIZE;
        let record_len = u32::try_from(total)
            .map_err(|_| CoreError::invalid_operation("segment record larger than 4 GiB"))?;

        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&record_len.to_le_bytes());
        buf.extend_from_slice(&self.collection_id.as_u32().to_le_bytes());
        buf.push(self.flags.as_byte());
        buf.extend_from_slice(&self.sequence.as_u64().to_le_bytes());
        put_bytes(&mut buf, &key)?;
        buf.extend_from_slice(&self.payload);

        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Decodes a record from exactly its encoded bytes.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < Self::FIXED_SIZE + 4 + Self::CRC_SIZE {
            return Err(CoreError::segment_corruption("record too short"));
        }

        let (body, crc_bytes) = data.split_at(data.len() - Self::CRC_SIZE);
        let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let actual = compute_crc32(body);
        if expected != actual {
            return Err(CoreError::ChecksumMismatch { expected, actual });
        }

        let mut reader = ByteReader::new(body, CoreError::segment_corruption);
        let record_len = reader.u32()? as usize;
        if record_len != data.len() {
            return Err(CoreError::segment_corruption(format!(
                "length field {record_len} does not match record size {}",
                data.len()
            )));
        }

        let collection_id = CollectionId::new(reader.u32()?);
        let flags = SegmentRecordFlags::from_byte(reader.u8()?);
        let sequence = SequenceNumber::new(reader.u64()?);
        let key = Key::decode(reader.bytes()?)
            .map_err(|e| CoreError::segment_corruption(format!("bad key: {e}")))?;
        let payload = reader.rest().to_vec();

        Ok(Self {
            collection_id,
            key,
            flags,
            payload,
            sequence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_record_decodes() {
        let record = SegmentRecord::put(
            CollectionId::new(1),
            Key::from("tarea_1"),
            vec![0xCA, 0xFE],
            SequenceNumber::new(3),
        );
        let bytes = record.encode().unwrap();
        let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(len, bytes.len());
        assert_eq!(record.encoded_len().unwrap(), bytes.len());
        assert_eq!(SegmentRecord::decode(&bytes).unwrap(), record);
    }

    #[test]
    fn tombstone_has_empty_payload() {
        let record =
            SegmentRecord::tombstone(CollectionId::new(2), Key::Integer(9), SequenceNumber::new(4));
        assert!(record.is_tombstone());
        let decoded = SegmentRecord::decode(&record.encode().unwrap()).unwrap();
        assert!(decoded.is_tombstone());
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn crc_detects_corruption() {
        let record = SegmentRecord::put(
            CollectionId::new(1),
            Key::Integer(1),
            vec![1, 2, 3],
            SequenceNumber::new(1),
        );
        let mut bytes = record.encode().unwrap();
        bytes[10] ^= 0x40;
        assert!(matches!(
            SegmentRecord::decode(&bytes),
            Err(CoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn short_input_rejected() {
        assert!(matches!(
            SegmentRecord::decode(&[0; 8]),
            Err(CoreError::SegmentCorruption { .. })
        ));
    }
}
