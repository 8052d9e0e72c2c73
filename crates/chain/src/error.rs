//! Chain log errors

use thiserror::Error;

/// Errors surfaced by the chain log engine
#[derive(Debug, Error)]
pub enum ChainError {
    /// Hash link or payload hash mismatch at a specific block
    #[error("chain integrity broken at sequence {sequence}: {reason}")]
    Integrity {
        /// Sequence number of the first offending block
        sequence: u64,
        /// What failed to line up
        reason: String,
    },

    /// A complete frame could not be decoded into a block
    #[error("undecodable block frame at file offset {offset}")]
    MalformedFrame {
        /// Byte offset of the frame start
        offset: u64,
    },

    /// Encoded block body exceeds the frame size limit; nothing was written
    #[error("block body of {length} bytes exceeds the frame limit")]
    FrameTooLarge {
        /// Canonical body length in bytes
        length: u64,
    },

    /// Unknown codec id in a block header
    #[error("unknown codec id {0}")]
    UnknownCodec(u8),

    /// Compression or decompression failure
    #[error("codec failure: {0}")]
    Codec(String),

    /// The cross-process append lock could not be acquired in time
    #[error("append lock busy: {path}")]
    LockBusy {
        /// Lock file path
        path: String,
    },

    /// Underlying I/O failure; the in-progress block is not committed
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Block body serialization failure
    #[error("block encoding failure: {0}")]
    Encode(#[from] bincode::Error),
}
