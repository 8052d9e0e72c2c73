//! Event dispatcher
//!
//! Turns one completed interaction into persisted history:
//!
//! 1. classify the outcome (raw error status, client exception, or a domain
//!    check such as an empty world snapshot)
//! 2. redact arguments and result
//! 3. dual-write the event: chain log append + mirror file append, with
//!    error-classified records also routed to the error channel
//! 4. commit usage counters to the delta store
//!
//! Every invocation mints a fresh event id; identical repeated commands are
//! never merged or deduplicated. Writes are attempted independently: a
//! failed sink is reported in the outcome (and logged), never rolled back
//! into the sinks that succeeded. The chain log is the authority; the other
//! views can be regenerated from it with [`rebuild`](crate::rebuild).

use chrono::Utc;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use chronicle_chain::{ChainError, ChainLog};
use chronicle_core::event::EVENT_SCHEMA_VERSION;
use chronicle_core::{
    DispatchConfig, ErrorCode, ErrorRecord, Event, EventStatus, InteractionRecord, Value,
};
use chronicle_delta::{DeltaError, DeltaStore, StateSnapshot};

use crate::mirror::{JsonListFile, MirrorError};
use crate::redact::Redactor;

/// Fixed message for the empty-world domain condition
pub const EMPTY_WORLD_MESSAGE: &str = "World not initialized: entities is empty";

/// Failure from one persistence sink
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Chain log append failed; the event is not in the authoritative log
    #[error("chain append failed: {0}")]
    Chain(#[from] ChainError),

    /// Mirror or error channel append failed
    #[error("mirror write failed: {0}")]
    Mirror(#[from] MirrorError),

    /// Counter stream commit failed
    #[error("counter commit failed: {0}")]
    Counters(#[from] DeltaError),

    /// Event serialization failed before any write
    #[error("event encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Sink a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    /// Authoritative chain log
    Chain,
    /// Human-readable mirror file
    Mirror,
    /// Error channel file
    ErrorChannel,
    /// Counter stream in the delta store
    Counters,
}

/// What one dispatch attempt produced and where it landed
#[derive(Debug)]
pub struct DispatchOutcome {
    /// The persisted (redacted) event
    pub event: Event,
    /// Error record routed to the error channel, if the outcome classified
    /// as an error
    pub error_record: Option<ErrorRecord>,
    /// Chain sequence number, when the chain append succeeded
    pub sequence: Option<u64>,
    /// Sinks that failed, with their errors; empty on a clean dispatch
    pub failures: Vec<(Sink, DispatchError)>,
}

impl DispatchOutcome {
    /// True when every attempted write succeeded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The event dispatcher: redaction + classification + dual write
pub struct Dispatcher {
    config: DispatchConfig,
    redactor: Redactor,
    chain: ChainLog,
    mirror: JsonListFile,
    errors: JsonListFile,
    state: DeltaStore,
}

impl Dispatcher {
    /// Build a dispatcher from configuration; no I/O happens until the
    /// first record
    pub fn new(config: DispatchConfig) -> Self {
        let redactor = Redactor::new(&config.sensitive_keys, &config.sensitive_command_args);
        let chain = ChainLog::open_with(config.chain_path(), config.chain.clone());
        let mirror = JsonListFile::new(config.mirror_path());
        let errors = JsonListFile::new(config.errors_path());
        let state = DeltaStore::open_with(config.state_dir(), config.delta.clone());
        Dispatcher {
            config,
            redactor,
            chain,
            mirror,
            errors,
            state,
        }
    }

    /// The configuration this dispatcher runs with
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Persist one completed interaction
    ///
    /// All sinks are attempted; failures are collected into the outcome and
    /// logged, never propagated as a panic or early return past the first
    /// sink.
    pub fn record(&self, record: InteractionRecord) -> DispatchOutcome {
        let (event, error_record) = self.build_event(&record);
        let mut failures = Vec::new();
        let mut sequence = None;

        // Chain log first: it is the source of truth.
        match serde_json::to_vec(&event) {
            Ok(payload) => match self.chain.append(&payload) {
                Ok(seq) => sequence = Some(seq),
                Err(e) => failures.push((Sink::Chain, DispatchError::Chain(e))),
            },
            Err(e) => failures.push((Sink::Chain, DispatchError::Encode(e))),
        }

        // Mirror is attempted regardless of how the chain write went.
        if let Err(e) = self.mirror.append(&event) {
            failures.push((Sink::Mirror, DispatchError::Mirror(e)));
        }

        if let Some(error_record) = &error_record {
            if let Err(e) = self.errors.append(error_record) {
                failures.push((Sink::ErrorChannel, DispatchError::Mirror(e)));
            }
        }

        if let Err(e) = self.update_counters(&event) {
            failures.push((Sink::Counters, e));
        }

        for (sink, error) in &failures {
            warn!(?sink, %error, cmd = %event.cmd, "dispatch sink failed");
        }

        DispatchOutcome {
            event,
            error_record,
            sequence,
            failures,
        }
    }

    /// Derive the redacted event and optional error record
    fn build_event(&self, record: &InteractionRecord) -> (Event, Option<ErrorRecord>) {
        let id = Uuid::new_v4().simple().to_string();
        let final_ts = record.t_final.unwrap_or_else(Utc::now);

        let ack_latency_ms = record
            .t_ack
            .map(|ack| round2(millis_between(record.t_start, ack)));
        let final_latency_ms = round2(millis_between(record.t_start, final_ts));

        let redacted_result = record.result.as_ref().map(|r| self.redactor.redact(r));
        let payload_size = redacted_result
            .as_ref()
            .and_then(|r| serde_json::to_vec(&r.to_json()).ok())
            .map(|bytes| bytes.len() as u64)
            .unwrap_or(0);

        let classification = classify(record);
        let status = if classification.is_some() {
            EventStatus::Error
        } else {
            EventStatus::Ok
        };

        let event = Event {
            schema: EVENT_SCHEMA_VERSION,
            id: id.clone(),
            job_id: record.job_id.clone(),
            ts: record.t_start,
            ack_ts: record.t_ack,
            final_ts,
            cmd: record.cmd.clone(),
            args: self.redactor.redact_args(&record.cmd, &record.args),
            status,
            result: redacted_result.clone(),
            ack_latency_ms,
            final_latency_ms,
            payload_size,
            error: record.error.clone(),
            agent_version: self.config.agent_version.clone(),
        };

        let error_record = classification.map(|(code, message)| ErrorRecord {
            timestamp: final_ts,
            code,
            message,
            cmd: record.cmd.clone(),
            event_id: id,
            details: redacted_result
                .or_else(|| record.error.as_ref().map(|e| Value::String(e.clone()))),
        });

        (event, error_record)
    }

    /// Bump the usage counters on the configured delta stream
    fn update_counters(&self, event: &Event) -> Result<(), DispatchError> {
        let stream = &self.config.counter_stream;
        let mut counters: StateSnapshot = self.state.load(stream)?;
        apply_event_to_counters(&mut counters, event);
        self.state.commit(stream, &counters)?;
        Ok(())
    }
}

/// Fold one event into the usage counters
///
/// Shared with [`rebuild`](crate::rebuild) so a counter stream regenerated
/// from the chain log matches one maintained incrementally.
pub(crate) fn apply_event_to_counters(counters: &mut StateSnapshot, event: &Event) {
    let total = counters
        .get("total_runs")
        .and_then(Value::as_int)
        .unwrap_or(0);
    counters.insert("total_runs".to_string(), Value::Int(total + 1));

    if event.status == EventStatus::Error {
        let errors = counters
            .get("error_runs")
            .and_then(Value::as_int)
            .unwrap_or(0);
        counters.insert("error_runs".to_string(), Value::Int(errors + 1));
    }

    counters.insert("last_cmd".to_string(), Value::String(event.cmd.clone()));
    counters.insert(
        "last_status".to_string(),
        Value::String(event.status.as_str().to_string()),
    );
    counters.insert("last_ts".to_string(), Value::String(event.ts.to_rfc3339()));

    let is_login = event.cmd == "login" || event.cmd == "login_password";
    if is_login && event.status == EventStatus::Ok {
        counters.insert(
            "last_login_ts".to_string(),
            Value::String(event.ts.to_rfc3339()),
        );
    }
}

/// Classify an interaction; `Some((code, message))` means error
fn classify(record: &InteractionRecord) -> Option<(ErrorCode, String)> {
    // Explicit error status from the transport.
    if record.status == "error" || record.status == "timeout" {
        let code = result_error_code(record).unwrap_or_else(|| {
            if record.status == "timeout" {
                if record.t_ack.is_none() {
                    ErrorCode::AckTimeout
                } else {
                    ErrorCode::FinalTimeout
                }
            } else {
                ErrorCode::ServerError
            }
        });
        let message = record
            .error
            .clone()
            .or_else(|| result_message(record))
            .unwrap_or_else(|| "request failed".to_string());
        return Some((code, message));
    }

    // Client-side exception with no server verdict.
    if let Some(error) = &record.error {
        return Some((ErrorCode::ClientException, error.clone()));
    }

    // Domain check: a successful worldstate_snapshot whose entities mapping
    // is present but empty means the world was never initialized.
    if record.cmd == "worldstate_snapshot" {
        if let Some(Value::Object(result)) = &record.result {
            if let Some(Value::Object(entities)) = result.get("entities") {
                if entities.is_empty() {
                    return Some((ErrorCode::EmptyWorld, EMPTY_WORLD_MESSAGE.to_string()));
                }
            }
        }
    }

    None
}

/// Pull a known domain code out of an error-shaped result, if present
fn result_error_code(record: &InteractionRecord) -> Option<ErrorCode> {
    let result = record.result.as_ref()?.as_object()?;
    match result.get("code")?.as_str()? {
        "EMPTY_WORLD" => Some(ErrorCode::EmptyWorld),
        "ACK_TIMEOUT" => Some(ErrorCode::AckTimeout),
        "FINAL_TIMEOUT" => Some(ErrorCode::FinalTimeout),
        "SERVER_ERROR" => Some(ErrorCode::ServerError),
        "CLIENT_EXCEPTION" => Some(ErrorCode::ClientException),
        _ => None,
    }
}

fn result_message(record: &InteractionRecord) -> Option<String> {
    record
        .result
        .as_ref()?
        .as_object()?
        .get("message")?
        .as_str()
        .map(|s| s.to_string())
}

fn millis_between(start: chrono::DateTime<Utc>, end: chrono::DateTime<Utc>) -> f64 {
    (end - start).num_microseconds().unwrap_or(0) as f64 / 1000.0
}

fn round2(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn base_record(cmd: &str) -> InteractionRecord {
        let start = Utc::now();
        InteractionRecord {
            cmd: cmd.to_string(),
            args: Vec::new(),
            status: "finished".to_string(),
            result: None,
            error: None,
            job_id: None,
            t_start: start,
            t_ack: Some(start + Duration::milliseconds(12)),
            t_final: Some(start + Duration::milliseconds(80)),
        }
    }

    fn dispatcher(dir: &std::path::Path) -> Dispatcher {
        Dispatcher::new(DispatchConfig::new(dir))
    }

    #[test]
    fn test_successful_run_is_clean_and_chained() {
        let dir = tempdir().unwrap();
        let d = dispatcher(dir.path());
        let mut record = base_record("run");
        record.result = Some(Value::from(serde_json::json!({"answer": 42})));

        let outcome = d.record(record);
        assert!(outcome.is_clean());
        assert_eq!(outcome.sequence, Some(0));
        assert_eq!(outcome.event.status, EventStatus::Ok);
        assert!(outcome.error_record.is_none());
        assert_eq!(outcome.event.ack_latency_ms, Some(12.0));
        assert_eq!(outcome.event.final_latency_ms, 80.0);
    }

    #[test]
    fn test_empty_world_synthesizes_error_record() {
        let dir = tempdir().unwrap();
        let d = dispatcher(dir.path());
        let mut record = base_record("worldstate_snapshot");
        record.result = Some(Value::from(serde_json::json!({
            "meta": {"version": 3},
            "entities": {},
            "location": {}
        })));

        let outcome = d.record(record);
        assert_eq!(outcome.event.status, EventStatus::Error);
        let error = outcome.error_record.expect("domain check fired");
        assert_eq!(error.code, ErrorCode::EmptyWorld);
        assert_eq!(error.message, EMPTY_WORLD_MESSAGE);

        // The error channel received it.
        let errors: Vec<ErrorRecord> = JsonListFile::new(d.config().errors_path())
            .read_all()
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::EmptyWorld);
    }

    #[test]
    fn test_populated_world_is_not_flagged() {
        let dir = tempdir().unwrap();
        let d = dispatcher(dir.path());
        let mut record = base_record("worldstate_snapshot");
        record.result = Some(Value::from(serde_json::json!({
            "entities": {"npc_1": {"kind": "merchant"}}
        })));

        let outcome = d.record(record);
        assert_eq!(outcome.event.status, EventStatus::Ok);
        assert!(outcome.error_record.is_none());
    }

    #[test]
    fn test_transport_error_classified() {
        let dir = tempdir().unwrap();
        let d = dispatcher(dir.path());
        let mut record = base_record("run");
        record.status = "error".to_string();
        record.error = Some("auth failed: Invalid password".to_string());

        let outcome = d.record(record);
        let error = outcome.error_record.expect("error classified");
        assert_eq!(error.code, ErrorCode::ServerError);
        assert_eq!(error.message, "auth failed: Invalid password");
    }

    #[test]
    fn test_ack_timeout_code() {
        let dir = tempdir().unwrap();
        let d = dispatcher(dir.path());
        let mut record = base_record("run");
        record.status = "timeout".to_string();
        record.t_ack = None;
        record.error = Some("timeout waiting for ack after 10s".to_string());

        let outcome = d.record(record);
        assert_eq!(
            outcome.error_record.expect("timeout classified").code,
            ErrorCode::AckTimeout
        );
    }

    #[test]
    fn test_client_exception_classified() {
        let dir = tempdir().unwrap();
        let d = dispatcher(dir.path());
        let mut record = base_record("run");
        record.error = Some("connection reset by peer".to_string());

        let outcome = d.record(record);
        assert_eq!(
            outcome.error_record.expect("exception classified").code,
            ErrorCode::ClientException
        );
    }

    #[test]
    fn test_login_redacts_credential_and_session_token() {
        let dir = tempdir().unwrap();
        let d = dispatcher(dir.path());
        let mut record = base_record("login");
        record.args = vec!["ada@example.com:pw".to_string(), "--ttl=3600".to_string()];
        record.result = Some(Value::from(serde_json::json!({
            "session_token": "top-secret",
            "device": "cli"
        })));

        let outcome = d.record(record);
        assert_eq!(outcome.event.args[0], "<redacted>");
        assert_eq!(outcome.event.args[1], "--ttl=3600");
        let result = outcome.event.result.as_ref().unwrap().as_object().unwrap();
        assert_eq!(
            result.get("session_token").and_then(Value::as_str),
            Some("<redacted>")
        );
        assert_eq!(result.get("device").and_then(Value::as_str), Some("cli"));
    }

    #[test]
    fn test_repeated_commands_get_distinct_ids_and_sequences() {
        let dir = tempdir().unwrap();
        let d = dispatcher(dir.path());
        let a = d.record(base_record("run"));
        let b = d.record(base_record("run"));
        assert_ne!(a.event.id, b.event.id);
        assert_eq!(a.sequence, Some(0));
        assert_eq!(b.sequence, Some(1));
    }

    #[test]
    fn test_counters_track_runs_and_login() {
        let dir = tempdir().unwrap();
        let d = dispatcher(dir.path());
        d.record(base_record("run"));
        d.record(base_record("login"));
        let mut err = base_record("run");
        err.status = "error".to_string();
        d.record(err);

        let counters = DeltaStore::open(d.config().state_dir())
            .load(&d.config().counter_stream)
            .unwrap();
        assert_eq!(counters.get("total_runs").and_then(Value::as_int), Some(3));
        assert_eq!(counters.get("error_runs").and_then(Value::as_int), Some(1));
        assert_eq!(
            counters.get("last_status").and_then(Value::as_str),
            Some("error")
        );
        assert!(counters.contains_key("last_login_ts"));
    }

    #[test]
    fn test_mirror_matches_chain_content() {
        let dir = tempdir().unwrap();
        let d = dispatcher(dir.path());
        d.record(base_record("run"));
        d.record(base_record("login"));

        let mirror: Vec<Event> = JsonListFile::new(d.config().mirror_path())
            .read_all()
            .unwrap();
        let chain = ChainLog::open(d.config().chain_path());
        let chained: Vec<Event> = chain
            .iter()
            .unwrap()
            .map(|r| serde_json::from_slice(&r.unwrap().1).unwrap())
            .collect();
        assert_eq!(mirror, chained);
    }

    #[test]
    fn test_mirror_failure_reported_chain_unaffected() {
        let dir = tempdir().unwrap();
        let d = dispatcher(dir.path());
        // Make the mirror path unwritable by occupying it with a directory.
        std::fs::create_dir_all(d.config().mirror_path()).unwrap();

        let outcome = d.record(base_record("run"));
        assert_eq!(outcome.sequence, Some(0), "chain write succeeded");
        assert!(!outcome.is_clean());
        assert!(outcome
            .failures
            .iter()
            .any(|(sink, _)| *sink == Sink::Mirror));
    }
}
