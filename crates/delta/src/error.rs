//! Delta store errors

use thiserror::Error;

/// Errors surfaced by the delta store engine
#[derive(Debug, Error)]
pub enum DeltaError {
    /// A persisted diff could not be applied (missing base, malformed patch)
    ///
    /// Reported, never silently skipped; the caller may fall back to the
    /// last good checkpoint.
    #[error("corrupt state in stream '{stream}': {reason}")]
    CorruptState {
        /// Stream the corruption was found in
        stream: String,
        /// What could not be applied or decoded
        reason: String,
    },

    /// Underlying I/O failure; the in-progress record is not committed
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Record serialization failure
    #[error("record encoding failure: {0}")]
    Encode(#[from] serde_json::Error),
}
