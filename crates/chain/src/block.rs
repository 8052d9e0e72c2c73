//! Block type and canonical encoding
//!
//! A block is the atomic unit of the chain log. Its canonical bytes are the
//! bincode encoding of the struct; `prev_hash` of block `i+1` is the SHA-256
//! of block `i`'s canonical bytes. The on-disk frame wraps the canonical
//! bytes in a little-endian u32 length prefix.
//!
//! The genesis block links to a fixed all-zero sentinel.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::codec::Codec;
use crate::error::ChainError;

/// Length of all hashes in the chain (SHA-256)
pub const BLOCK_HASH_LEN: usize = 32;

/// Sentinel `prev_hash` of the genesis block
pub const GENESIS_PREV_HASH: [u8; BLOCK_HASH_LEN] = [0u8; BLOCK_HASH_LEN];

/// Upper bound on a single frame; a length prefix beyond this is treated as
/// a torn or garbage tail, not a real block.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// One hash-linked block of the chain log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Zero-based position in the chain
    pub sequence: u64,
    /// SHA-256 of the previous block's canonical bytes (sentinel at genesis)
    pub prev_hash: [u8; BLOCK_HASH_LEN],
    /// Codec that produced `payload`
    pub codec_id: u8,
    /// SHA-256 of the uncompressed payload
    pub payload_hash: [u8; BLOCK_HASH_LEN],
    /// Compressed payload bytes
    pub payload: Vec<u8>,
}

impl Block {
    /// Build a block linking to `prev_hash`, compressing `payload` with `codec`
    pub fn seal(
        sequence: u64,
        prev_hash: [u8; BLOCK_HASH_LEN],
        payload: &[u8],
        codec: Codec,
        compression_level: i32,
    ) -> Result<Self, ChainError> {
        let compressed = codec.compress(payload, compression_level)?;
        Ok(Block {
            sequence,
            prev_hash,
            codec_id: codec.id(),
            payload_hash: sha256(payload),
            payload: compressed,
        })
    }

    /// Canonical byte encoding of this block
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, ChainError> {
        Ok(bincode::serialize(self)?)
    }

    /// SHA-256 of this block's canonical bytes (what the next block links to)
    pub fn hash(&self) -> Result<[u8; BLOCK_HASH_LEN], ChainError> {
        Ok(sha256(&self.canonical_bytes()?))
    }

    /// Decode a block from its canonical bytes
    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Decompress and integrity-check the payload
    ///
    /// Fails with an integrity error when the decompressed bytes do not
    /// match `payload_hash`.
    pub fn open_payload(&self) -> Result<Vec<u8>, ChainError> {
        let codec = Codec::from_id(self.codec_id)?;
        let payload = codec.decompress(&self.payload)?;
        if sha256(&payload) != self.payload_hash {
            return Err(ChainError::Integrity {
                sequence: self.sequence,
                reason: "payload hash mismatch".to_string(),
            });
        }
        Ok(payload)
    }
}

/// SHA-256 helper
pub(crate) fn sha256(bytes: &[u8]) -> [u8; BLOCK_HASH_LEN] {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; BLOCK_HASH_LEN];
    out.copy_from_slice(&digest);
    out
}
