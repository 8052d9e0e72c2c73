//! Per-block payload codecs
//!
//! The codec id is stored in every block header, so old blocks stay
//! decodable after the default codec changes. Identity exists for tests and
//! for payloads that do not compress.

use crate::error::ChainError;

/// Payload compression codec, selected per block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// No transformation
    Identity,
    /// zstd general-purpose compression
    Zstd,
}

impl Codec {
    /// Codec id byte stored in the block header
    pub fn id(&self) -> u8 {
        match self {
            Codec::Identity => 0,
            Codec::Zstd => 1,
        }
    }

    /// Resolve a codec id read from a block header
    pub fn from_id(id: u8) -> Result<Self, ChainError> {
        match id {
            0 => Ok(Codec::Identity),
            1 => Ok(Codec::Zstd),
            other => Err(ChainError::UnknownCodec(other)),
        }
    }

    /// Compress a payload with this codec
    pub fn compress(&self, payload: &[u8], level: i32) -> Result<Vec<u8>, ChainError> {
        match self {
            Codec::Identity => Ok(payload.to_vec()),
            Codec::Zstd => zstd::bulk::compress(payload, level)
                .map_err(|e| ChainError::Codec(format!("zstd encode: {}", e))),
        }
    }

    /// Decompress a block payload with this codec
    pub fn decompress(&self, payload: &[u8]) -> Result<Vec<u8>, ChainError> {
        match self {
            Codec::Identity => Ok(payload.to_vec()),
            Codec::Zstd => {
                // Block payloads are events of at most a few megabytes;
                // cap the decode buffer so a corrupt header cannot balloon.
                const MAX_DECODED: usize = 64 * 1024 * 1024;
                zstd::bulk::decompress(payload, MAX_DECODED)
                    .map_err(|e| ChainError::Codec(format!("zstd decode: {}", e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_ids_round_trip() {
        for codec in [Codec::Identity, Codec::Zstd] {
            assert_eq!(Codec::from_id(codec.id()).unwrap(), codec);
        }
    }

    #[test]
    fn test_unknown_codec_id_rejected() {
        assert!(matches!(Codec::from_id(99), Err(ChainError::UnknownCodec(99))));
    }

    #[test]
    fn test_zstd_round_trip() {
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(50);
        let compressed = Codec::Zstd.compress(&payload, 3).unwrap();
        assert!(compressed.len() < payload.len());
        assert_eq!(Codec::Zstd.decompress(&compressed).unwrap(), payload);
    }

    #[test]
    fn test_identity_is_verbatim() {
        let payload = b"raw".to_vec();
        assert_eq!(Codec::Identity.compress(&payload, 0).unwrap(), payload);
        assert_eq!(Codec::Identity.decompress(&payload).unwrap(), payload);
    }
}
