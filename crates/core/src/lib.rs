//! Core types for Chronicle
//!
//! This crate defines the shared vocabulary of the persistence engine:
//! - `Value`: the canonical tagged value type all structural operations
//!   (redaction, diff/patch) work on
//! - Event and error record types produced by the dispatcher
//! - Configuration structs threaded into the engines (nothing hard-coded)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod event;
pub mod value;

pub use config::{
    ChainOptions, DeltaOptions, DispatchConfig, DEFAULT_SENSITIVE_KEYS, REDACTION_MARKER,
};
pub use event::{ErrorCode, ErrorRecord, Event, EventStatus, InteractionRecord};
pub use value::Value;
