//! Database manifest: version and schema.

use crate::error::{CoreError, CoreResult};
use crate::key::KeyPath;
use crate::types::{CollectionId, SequenceNumber};
use crate::wire::{compute_crc32, put_bytes, ByteReader};
use std::collections::BTreeMap;

/// Magic bytes for manifest file.
pub const MANIFEST_MAGIC: [u8; 4] = *b"RDBM";

/// Current manifest version.
pub const MANIFEST_VERSION: u16 = 1;

/// A declared collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionMeta {
    /// Stable numeric ID.
    pub id: CollectionId,
    /// Field holding the primary key.
    pub key_path: KeyPath,
}

/// Database manifest.
///
/// The manifest stores:
/// - the format version
/// - the user-visible database version (0 until the first upgrade)
/// - the collection registry with key paths
/// - the last checkpoint sequence
///
/// Collection IDs come from a counter that only grows, so a deleted
/// collection's ID is never handed out again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Format version (major, minor).
    pub format_version: (u16, u16),
    /// Database version set by the last successful upgrade.
    pub user_version: u64,
    /// Collections by name.
    pub collections: BTreeMap<String, CollectionMeta>,
    /// Next collection ID to assign.
    pub next_collection_id: u32,
    /// Last checkpoint sequence number.
    pub last_checkpoint: Option<SequenceNumber>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new((1, 0))
    }
}

impl Manifest {
    /// Creates a new empty manifest.
    #[must_use]
    pub fn new(format_version: (u16, u16)) -> Self {
        Self {
            format_version,
            user_version: 0,
            collections: BTreeMap::new(),
            next_collection_id: 1,
            last_checkpoint: None,
        }
    }

    /// Declares a collection.
    ///
    /// # Errors
    ///
    /// Fails with a constraint error if the name is taken.
    pub fn create_collection(&mut self, name: &str, key_path: KeyPath) -> CoreResult<CollectionId> {
        if self.collections.contains_key(name) {
            return Err(CoreError::duplicate_collection(name));
        }
        if name.is_empty() {
            return Err(CoreError::data("collection name is empty"));
        }

        let id = CollectionId::new(self.next_collection_id);
        self.next_collection_id = self
            .next_collection_id
            .checked_add(1)
            .ok_or_else(|| CoreError::invalid_operation("collection IDs exhausted"))?;
        self.collections
            .insert(name.to_string(), CollectionMeta { id, key_path });
        Ok(id)
    }

    /// Removes a collection, returning its metadata.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::CollectionNotFound`] if it does not exist.
    pub fn delete_collection(&mut self, name: &str) -> CoreResult<CollectionMeta> {
        self.collections
            .remove(name)
            .ok_or_else(|| CoreError::collection_not_found(name))
    }

    /// Gets a collection by name.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&CollectionMeta> {
        self.collections.get(name)
    }

    /// Whether `id` belongs to a live collection.
    #[must_use]
    pub fn is_live(&self, id: CollectionId) -> bool {
        self.collections.values().any(|meta| meta.id == id)
    }

    /// Name of the collection with `id`.
    #[must_use]
    pub fn name_of(&self, id: CollectionId) -> Option<&str> {
        self.collections
            .iter()
            .find(|(_, meta)| meta.id == id)
            .map(|(name, _)| name.as_str())
    }

    /// Encodes the manifest to bytes.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();

        buf.extend_from_slice(&MANIFEST_MAGIC);
        buf.extend_from_slice(&MANIFEST_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.format_version.0.to_le_bytes());
        buf.extend_from_slice(&self.format_version.1.to_le_bytes());
        buf.extend_from_slice(&self.user_version.to_le_bytes());
        buf.extend_from_slice(&self.next_collection_id.to_le_bytes());

        let count = u32::try_from(self.collections.len())
            .map_err(|_| CoreError::invalid_operation("too many collections"))?;
        buf.extend_from_slice(&count.to_le_bytes());
        for (name, meta) in &self.collections {
            put_bytes(&mut buf, name.as_bytes())?;
            buf.extend_from_slice(&meta.id.as_u32().to_le_bytes());
            put_bytes(&mut buf, meta.key_path.as_str().as_bytes())?;
        }

        match self.last_checkpoint {
            Some(seq) => {
                buf.push(1);
                buf.extend_from_slice(&seq.as_u64().to_le_bytes());
            }
            None => buf.push(0),
        }

        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Decodes a manifest from bytes.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < 8 || data[0..4] != MANIFEST_MAGIC {
            return Err(CoreError::invalid_format("invalid manifest magic"));
        }

        let (body, crc_bytes) = data.split_at(data.len() - 4);
        let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let actual = compute_crc32(body);
        if expected != actual {
            return Err(CoreError::ChecksumMismatch { expected, actual });
        }

        let mut reader = ByteReader::new(&body[4..], CoreError::invalid_format);
        let version = reader.u16()?;
        if version > MANIFEST_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported manifest version: {version}"
            )));
        }

        let format_version = (reader.u16()?, reader.u16()?);
        let user_version = reader.u64()?;
        let next_collection_id = reader.u32()?;

        let count = reader.u32()?;
        let mut collections = BTreeMap::new();
        for _ in 0..count {
            let name = reader.string()?;
            let id = CollectionId::new(reader.u32()?);
            let key_path = KeyPath::parse(&reader.string()?)
                .map_err(|e| CoreError::invalid_format(e.to_string()))?;
            if id.as_u32() >= next_collection_id {
                return Err(CoreError::invalid_format(format!(
                    "collection {name} has id {id} beyond the id counter"
                )));
            }
            collections.insert(name, CollectionMeta { id, key_path });
        }

        let last_checkpoint = match reader.u8()? {
            0 => None,
            _ => Some(SequenceNumber::new(reader.u64()?)),
        };
        reader.finish()?;

        Ok(Self {
            format_version,
            user_version,
            collections,
            next_collection_id,
            last_checkpoint,
        })
    }
}
