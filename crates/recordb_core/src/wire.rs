//! Little-endian framing helpers shared by the manifest, WAL and segments.

use crate::error::CoreError;

/// CRC-32 (IEEE) lookup table.
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Computes the CRC-32 (IEEE) checksum of `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

/// Appends a length-prefixed (u32) byte string.
pub(crate) fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> Result<(), CoreError> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| CoreError::invalid_operation("field larger than 4 GiB"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Sequential reader over a byte slice.
///
/// Every read that runs off the end produces the error built by `corrupt`,
/// so each format reports truncation in its own terms.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    corrupt: fn(String) -> CoreError,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8], corrupt: fn(String) -> CoreError) -> Self {
        Self {
            data,
            pos: 0,
            corrupt,
        }
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], CoreError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                (self.corrupt)(format!(
                    "unexpected end of data: need {len} bytes at offset {}",
                    self.pos
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CoreError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, CoreError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, CoreError> {
        self.array().map(u16::from_le_bytes)
    }

    pub(crate) fn u32(&mut self) -> Result<u32, CoreError> {
        self.array().map(u32::from_le_bytes)
    }

    pub(crate) fn u64(&mut self) -> Result<u64, CoreError> {
        self.array().map(u64::from_le_bytes)
    }

    /// Reads a u32 length prefix and that many bytes.
    pub(crate) fn bytes(&mut self) -> Result<&'a [u8], CoreError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    pub(crate) fn string(&mut self) -> Result<String, CoreError> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| (self.corrupt)("invalid UTF-8".into()))
    }

    /// Consumes and returns everything left.
    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }

    /// Fails unless every byte has been consumed.
    pub(crate) fn finish(&self) -> Result<(), CoreError> {
        if self.pos == self.data.len() {
            Ok(())
        } else {
            Err((self.corrupt)(format!(
                "{} trailing bytes",
                self.data.len() - self.pos
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn reader_walks_fields() {
        let mut buf = vec![7u8];
        buf.extend_from_slice(&300u16.to_le_bytes());
        buf.extend_from_slice(&9u64.to_le_bytes());
        put_bytes(&mut buf, b"tasks").unwrap();

        let mut reader = ByteReader::new(&buf, CoreError::invalid_format);
        assert_eq!(reader.u8().unwrap(), 7);
        assert_eq!(reader.u16().unwrap(), 300);
        assert_eq!(reader.u64().unwrap(), 9);
        assert_eq!(reader.string().unwrap(), "tasks");
        reader.finish().unwrap();
    }

    #[test]
    fn reader_reports_truncation() {
        let mut reader = ByteReader::new(&[1, 2], CoreError::wal_corruption);
        assert!(matches!(reader.u32(), Err(CoreError::WalCorruption { .. })));

        let reader = ByteReader::new(&[1], CoreError::invalid_format);
        assert!(reader.finish().is_err());
    }
}
