//! Self-describing blob encoding.
//!
//! Every blob starts with a fixed-size header naming the transition it
//! carries, followed by a bincode payload that may be zstd-compressed. The
//! header checksum covers the stored (possibly compressed) payload bytes.

use std::io::{Cursor, Read};

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, RelayResult};
use crate::state::dataset::SnapshotImage;
use crate::state::delta::DatasetDelta;
use crate::types::{BlobType, TransitionKey, Version};

pub(crate) const BLOB_MAGIC: u32 = 0x42_52_42_31; // "BRB1"
pub(crate) const BLOB_FORMAT_VERSION: u16 = 1;
pub(crate) const BLOB_FLAG_COMPRESSED: u16 = 0x0001;
pub(crate) const BLOB_HEADER_SIZE: usize = 56;

/// Contents of a blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobPayload {
    Snapshot(SnapshotImage),
    Delta(DatasetDelta),
}

/// Encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOptions {
    pub compress: bool,
    pub compression_level: i32,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            compress: false,
            compression_level: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BlobHeader {
    pub magic: u32,
    pub version: u16,
    pub flags: u16,
    pub from: Version,
    pub to: Version,
    pub blob_type: BlobType,
    pub stored_len: u64,
    pub uncompressed_len: u64,
    pub checksum: u64,
}

impl BlobHeader {
    pub(crate) fn to_bytes(&self) -> [u8; BLOB_HEADER_SIZE] {
        let mut buffer = [0u8; BLOB_HEADER_SIZE];
        buffer[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buffer[4..6].copy_from_slice(&self.version.to_le_bytes());
        buffer[6..8].copy_from_slice(&self.flags.to_le_bytes());
        buffer[8..16].copy_from_slice(&self.from.get().to_le_bytes());
        buffer[16..24].copy_from_slice(&self.to.get().to_le_bytes());
        buffer[24] = self.blob_type.as_u8();
        // 25..32 reserved
        buffer[32..40].copy_from_slice(&self.stored_len.to_le_bytes());
        buffer[40..48].copy_from_slice(&self.uncompressed_len.to_le_bytes());
        buffer[48..56].copy_from_slice(&self.checksum.to_le_bytes());
        buffer
    }

    pub(crate) fn from_bytes(bytes: &[u8; BLOB_HEADER_SIZE]) -> Result<Self, String> {
        let magic = u32::from_le_bytes(array(bytes, 0));
        if magic != BLOB_MAGIC {
            return Err("invalid magic".to_string());
        }

        let version = u16::from_le_bytes(array(bytes, 4));
        if version != BLOB_FORMAT_VERSION {
            return Err(format!("unsupported format version {version}"));
        }

        let flags = u16::from_le_bytes(array(bytes, 6));
        let blob_type = BlobType::from_u8(bytes[24])
            .ok_or_else(|| format!("unknown blob type tag {}", bytes[24]))?;

        Ok(Self {
            magic,
            version,
            flags,
            from: Version::new(u64::from_le_bytes(array(bytes, 8))),
            to: Version::new(u64::from_le_bytes(array(bytes, 16))),
            blob_type,
            stored_len: u64::from_le_bytes(array(bytes, 32)),
            uncompressed_len: u64::from_le_bytes(array(bytes, 40)),
            checksum: u64::from_le_bytes(array(bytes, 48)),
        })
    }

    fn transition(&self) -> TransitionKey {
        TransitionKey {
            from: (self.blob_type != BlobType::Snapshot).then_some(self.from),
            to: self.to,
            blob_type: self.blob_type,
        }
    }
}

fn array<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

pub(crate) fn checksum_to_u64(hash: blake3::Hash) -> u64 {
    u64::from_le_bytes(array(hash.as_bytes(), 0))
}

/// Serializes `payload` as the blob identified by `transition`.
pub fn encode_blob(
    transition: &TransitionKey,
    payload: &BlobPayload,
    options: &CodecOptions,
) -> RelayResult<Vec<u8>> {
    check_payload(transition, payload).map_err(|reason| RelayError::BlobCorrupted {
        transition: *transition,
        reason,
    })?;

    let serialized = bincode::serialize(payload)?;
    let uncompressed_len = serialized.len() as u64;
    let (stored, flags) = if options.compress {
        (
            zstd::stream::encode_all(Cursor::new(&serialized), options.compression_level)?,
            BLOB_FLAG_COMPRESSED,
        )
    } else {
        (serialized, 0)
    };

    let header = BlobHeader {
        magic: BLOB_MAGIC,
        version: BLOB_FORMAT_VERSION,
        flags,
        from: transition.from.unwrap_or(Version::NONE),
        to: transition.to,
        blob_type: transition.blob_type,
        stored_len: stored.len() as u64,
        uncompressed_len,
        checksum: checksum_to_u64(blake3::hash(&stored)),
    };

    let mut bytes = Vec::with_capacity(BLOB_HEADER_SIZE + stored.len());
    bytes.extend_from_slice(&header.to_bytes());
    bytes.extend_from_slice(&stored);
    Ok(bytes)
}

/// Reads and verifies the blob expected to carry `transition`.
///
/// Any disagreement between the header, the payload and the expected
/// transition is reported as [`RelayError::BlobCorrupted`].
pub fn decode_blob(transition: &TransitionKey, mut reader: impl Read) -> RelayResult<BlobPayload> {
    let corrupted = |reason: String| RelayError::BlobCorrupted {
        transition: *transition,
        reason,
    };

    let mut header_bytes = [0u8; BLOB_HEADER_SIZE];
    reader.read_exact(&mut header_bytes).map_err(|err| {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            corrupted("truncated header".to_string())
        } else {
            RelayError::Io(err)
        }
    })?;
    let header = BlobHeader::from_bytes(&header_bytes).map_err(corrupted)?;

    if header.transition() != *transition {
        return Err(corrupted(format!(
            "header describes {} instead",
            header.transition()
        )));
    }

    let mut stored = Vec::new();
    reader.read_to_end(&mut stored)?;
    if stored.len() as u64 != header.stored_len {
        return Err(corrupted(format!(
            "payload length {} does not match header length {}",
            stored.len(),
            header.stored_len
        )));
    }

    if checksum_to_u64(blake3::hash(&stored)) != header.checksum {
        return Err(corrupted("checksum mismatch".to_string()));
    }

    let serialized = if header.flags & BLOB_FLAG_COMPRESSED != 0 {
        zstd::stream::decode_all(Cursor::new(&stored))
            .map_err(|err| corrupted(format!("decompression failed: {err}")))?
    } else {
        stored
    };

    if serialized.len() as u64 != header.uncompressed_len {
        return Err(corrupted("uncompressed length mismatch".to_string()));
    }

    let payload: BlobPayload = bincode::deserialize(&serialized)
        .map_err(|err| corrupted(format!("undecodable payload: {err}")))?;
    check_payload(transition, &payload).map_err(corrupted)?;
    Ok(payload)
}

fn check_payload(transition: &TransitionKey, payload: &BlobPayload) -> Result<(), String> {
    match (transition.blob_type, payload) {
        (BlobType::Snapshot, BlobPayload::Snapshot(image)) => {
            if image.version != transition.to {
                return Err(format!(
                    "snapshot payload is for version {}",
                    image.version
                ));
            }
        }
        (BlobType::Delta | BlobType::ReverseDelta, BlobPayload::Delta(delta)) => {
            if Some(delta.from) != transition.from || delta.to != transition.to {
                return Err(format!(
                    "delta payload moves {} -> {}",
                    delta.from, delta.to
                ));
            }
        }
        _ => return Err("payload kind does not match blob type".to_string()),
    }
    Ok(())
}
