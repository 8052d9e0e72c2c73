//! Delta store engine for Chronicle
//!
//! Maintains one logical current-state object per named stream and persists
//! only the difference from the last persisted state, with periodic full
//! checkpoints so reconstruction replays "since the last checkpoint", never
//! "since the beginning of time".
//!
//! The store is append-only: committing writes a new delta file (and
//! sometimes a new checkpoint file); nothing is ever rewritten or deleted.
//! Old deltas become irrelevant for replay once a newer checkpoint exists,
//! but they stay on disk.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod diff;
pub mod error;
pub mod store;

pub use diff::{apply_diff, diff_states, Diff, DiffEntry};
pub use error::DeltaError;
pub use store::{DeltaStore, StateSnapshot};
