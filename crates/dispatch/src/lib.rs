//! Event dispatch layer for Chronicle
//!
//! Receives completed interaction records from the external client layer,
//! applies redaction, derives event metadata, and dual-writes every event to
//! the chain log (authoritative) and the human-readable mirror file.
//! Error-classified outcomes additionally go to a dedicated error channel,
//! and running usage counters are committed to the delta store.
//!
//! The three writes are not transactionally atomic across each other: the
//! chain log is the source of truth, and [`rebuild`] re-derives the mirror
//! and counter stream from it after a partial failure.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dispatcher;
pub mod mirror;
pub mod rebuild;
pub mod redact;

pub use dispatcher::{DispatchError, DispatchOutcome, Dispatcher, Sink, EMPTY_WORLD_MESSAGE};
pub use mirror::{JsonListFile, MirrorError};
pub use rebuild::{rebuild, RebuildReport};
pub use redact::Redactor;
