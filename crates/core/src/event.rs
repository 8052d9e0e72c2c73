//! Event and error record types
//!
//! An `InteractionRecord` is what the external client layer hands the
//! dispatcher after a remote call completes or fails. The dispatcher turns
//! it into an immutable `Event` (and possibly an `ErrorRecord`) which is
//! what actually gets persisted.
//!
//! Events are append-only: never mutated, never deleted, never deduplicated.
//! Two identical commands produce two independent events with distinct ids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Schema version stamped into every persisted event
pub const EVENT_SCHEMA_VERSION: u32 = 1;

/// Terminal status of an interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// The remote call finished and returned a result
    Ok,
    /// The remote call reported an error, timed out, or a domain check fired
    Error,
}

impl EventStatus {
    /// Wire string used in the mirror file and exports
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Ok => "ok",
            EventStatus::Error => "error",
        }
    }
}

/// Closed set of domain error codes
///
/// These are data outcomes, not failures of the engine: they flow through
/// the error channel and never abort the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// `worldstate_snapshot` returned successfully but `entities` was an
    /// empty mapping: the world was never initialized
    #[serde(rename = "EMPTY_WORLD")]
    EmptyWorld,
    /// The server reported an error status for the request
    #[serde(rename = "SERVER_ERROR")]
    ServerError,
    /// The client layer raised a transport or protocol exception
    #[serde(rename = "CLIENT_EXCEPTION")]
    ClientException,
    /// No acknowledgement arrived within the ack window
    #[serde(rename = "ACK_TIMEOUT")]
    AckTimeout,
    /// No final result arrived within the completion window
    #[serde(rename = "FINAL_TIMEOUT")]
    FinalTimeout,
}

impl ErrorCode {
    /// Wire string for this code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::EmptyWorld => "EMPTY_WORLD",
            ErrorCode::ServerError => "SERVER_ERROR",
            ErrorCode::ClientException => "CLIENT_EXCEPTION",
            ErrorCode::AckTimeout => "ACK_TIMEOUT",
            ErrorCode::FinalTimeout => "FINAL_TIMEOUT",
        }
    }
}

/// Raw outcome handed to the dispatcher by the excluded network/CLI layer
///
/// Timestamps are captured by the caller around the remote round trip; the
/// dispatcher only derives latencies from them, it never reads the clock for
/// anything except the final fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    /// Module/command name that ran (e.g. `login`, `worldstate_snapshot`)
    pub cmd: String,
    /// Positional arguments as typed by the user (unredacted)
    pub args: Vec<String>,
    /// Raw status string from the transport (`finished`, `error`, `timeout`)
    pub status: String,
    /// Terminal result payload, if any (unredacted)
    pub result: Option<Value>,
    /// Transport-level error message, if any
    pub error: Option<String>,
    /// Server-assigned job id, if one was issued
    pub job_id: Option<String>,
    /// When the request was sent
    pub t_start: DateTime<Utc>,
    /// When the server acknowledged, if it did
    pub t_ack: Option<DateTime<Utc>>,
    /// When the terminal frame arrived, if it did
    pub t_final: Option<DateTime<Utc>>,
}

/// One immutable, redacted interaction event
///
/// This is the canonical persisted form: the chain log stores its JSON
/// serialization compressed inside a block, and the mirror file stores it
/// verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event schema version
    pub schema: u32,
    /// Fresh id minted per invocation; never reused
    pub id: String,
    /// Server-assigned job id, if any
    pub job_id: Option<String>,
    /// Wall-clock start of the interaction (UTC)
    pub ts: DateTime<Utc>,
    /// Acknowledgement time, if the server acked
    pub ack_ts: Option<DateTime<Utc>>,
    /// Terminal time
    pub final_ts: DateTime<Utc>,
    /// Command name
    pub cmd: String,
    /// Arguments after redaction
    pub args: Vec<String>,
    /// Terminal status
    pub status: EventStatus,
    /// Result payload after redaction
    pub result: Option<Value>,
    /// Milliseconds from send to ack
    pub ack_latency_ms: Option<f64>,
    /// Milliseconds from send to terminal frame
    pub final_latency_ms: f64,
    /// Serialized size of the redacted result, in bytes
    pub payload_size: u64,
    /// Transport error message, if any
    pub error: Option<String>,
    /// Version of the agent that produced this event
    pub agent_version: String,
}

/// Error-channel record: an event outcome classified as an error
///
/// Same shape as the event data it derives from, plus the closed domain code
/// and a human-readable message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// When the error was recorded (UTC)
    pub timestamp: DateTime<Utc>,
    /// Domain error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Command that produced the error
    pub cmd: String,
    /// Event id this error belongs to
    pub event_id: String,
    /// Redacted context (the raw error frame or the offending result)
    pub details: Option<Value>,
}
