//! Chain log engine for Chronicle
//!
//! Append-only store of compressed, hash-linked blocks. This is the
//! authoritative event history: every other persisted view (mirror file,
//! counter stream) can be rebuilt from it.
//!
//! ## Guarantees
//!
//! - **Tamper evidence**: every block carries the SHA-256 of its
//!   predecessor's canonical bytes. Editing any historical block invalidates
//!   every later link.
//! - **Crash consistency**: blocks are framed and fsynced per append. A
//!   crash mid-write leaves a torn trailing frame, which readers treat as
//!   "the log ends here", never as corruption of earlier blocks.
//! - **Single writer**: appends are serialized by an in-process mutex plus a
//!   cross-process lock file scoped to the append operation only. Readers
//!   never take the lock.
//!
//! ## Non-goals
//!
//! This is not a general log store: the only operations are append, verified
//! forward iteration, and full-chain verification.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod block;
pub mod codec;
pub mod error;
pub mod log;

pub use block::{Block, BLOCK_HASH_LEN, GENESIS_PREV_HASH};
pub use codec::Codec;
pub use error::ChainError;
pub use log::{ChainIter, ChainLog, VerifyReport};
