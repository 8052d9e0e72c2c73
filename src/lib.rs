//! # Chronicle
//!
//! Tamper-evident observability persistence for remote-agent CLIs.
//!
//! Chronicle records every command a CLI exchanges with a remote agent into
//! an append-only, hash-chained, compressed log, alongside a human-readable
//! JSON mirror, a dedicated error channel, and diff-based usage counters.
//!
//! ## Quick Start
//!
//! ```ignore
//! use chronicle::prelude::*;
//!
//! let config = DispatchConfig::new(".chronicle");
//! let dispatcher = Dispatcher::new(config);
//!
//! let outcome = dispatcher.record(InteractionRecord {
//!     cmd: "login".to_string(),
//!     args: vec!["alice@example.com:pw".to_string()],
//!     status: "finished".to_string(),
//!     result: None,
//!     error: None,
//!     job_id: None,
//!     t_start: chrono::Utc::now(),
//!     t_ack: None,
//!     t_final: Some(chrono::Utc::now()),
//! });
//! assert!(outcome.is_clean());
//! ```
//!
//! ## Layout
//!
//! - [`chronicle_core`] - shared types: [`Event`], [`Value`], configuration
//! - [`chronicle_chain`] - the hash-chained block log ([`ChainLog`])
//! - [`chronicle_delta`] - diff-based state store ([`DeltaStore`])
//! - [`chronicle_dispatch`] - redaction, classification, dual write
//!   ([`Dispatcher`])
//!
//! The chain log is the authority: the mirror file and counters can always
//! be regenerated from it with [`rebuild`].

#![warn(missing_docs)]

pub mod prelude;

// Re-export the engines under one roof
pub use chronicle_chain::{ChainError, ChainLog, Codec, VerifyReport};
pub use chronicle_core::{
    ChainOptions, DeltaOptions, DispatchConfig, ErrorCode, ErrorRecord, Event, EventStatus,
    InteractionRecord, Value, DEFAULT_SENSITIVE_KEYS, REDACTION_MARKER,
};
pub use chronicle_delta::{DeltaError, DeltaStore, Diff, DiffEntry, StateSnapshot};
pub use chronicle_dispatch::{
    rebuild, DispatchError, DispatchOutcome, Dispatcher, JsonListFile, RebuildReport, Redactor,
    Sink,
};
