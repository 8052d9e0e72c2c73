//! Derived-view rebuild
//!
//! The dispatcher's three writes are not transactionally atomic across each
//! other. After a crash between them, the chain log is authoritative and
//! the mirror file and counter stream may lag behind. This module
//! re-derives both from the chain alone.
//!
//! Rebuild is a recovery operation, not a hot-path dependency: nothing in
//! the dispatch path reads the mirror or counters back.

use tracing::{info, warn};

use chronicle_chain::{ChainError, ChainLog};
use chronicle_core::{DispatchConfig, Event};
use chronicle_delta::{DeltaStore, StateSnapshot};

use crate::dispatcher::{apply_event_to_counters, DispatchError};
use crate::mirror::JsonListFile;

/// What a rebuild pass found and wrote
#[derive(Debug, Clone)]
pub struct RebuildReport {
    /// Blocks read from the chain before the end (or a break)
    pub blocks_read: u64,
    /// Events decoded and written to the mirror
    pub events_rebuilt: u64,
    /// Blocks whose payload did not decode as an event (skipped)
    pub undecodable_events: u64,
    /// Sequence number where chain integrity broke, if it did
    pub chain_break_at: Option<u64>,
    /// Whether the counter stream changed
    pub counters_updated: bool,
}

impl RebuildReport {
    /// Human-readable one-line summary
    pub fn summary(&self) -> String {
        let chain = match self.chain_break_at {
            None => "chain intact".to_string(),
            Some(seq) => format!("chain broken at sequence {}", seq),
        };
        format!(
            "Rebuild complete: {} blocks, {} events to mirror, {} undecodable, counters {} ({})",
            self.blocks_read,
            self.events_rebuilt,
            self.undecodable_events,
            if self.counters_updated {
                "updated"
            } else {
                "unchanged"
            },
            chain
        )
    }
}

/// Regenerate the mirror file and counter stream from the chain log
///
/// Walks the verified chain, decodes every event, rewrites `events.json`
/// wholesale, and commits freshly folded counters to the configured stream.
/// Stops at an integrity break and reports it; everything before the break
/// is still rebuilt.
pub fn rebuild(config: &DispatchConfig) -> Result<RebuildReport, DispatchError> {
    let chain = ChainLog::open_with(config.chain_path(), config.chain.clone());
    let mirror = JsonListFile::new(config.mirror_path());
    let store = DeltaStore::open_with(config.state_dir(), config.delta.clone());

    let mut events: Vec<Event> = Vec::new();
    let mut counters = StateSnapshot::new();
    let mut report = RebuildReport {
        blocks_read: 0,
        events_rebuilt: 0,
        undecodable_events: 0,
        chain_break_at: None,
        counters_updated: false,
    };

    for item in chain.iter()? {
        match item {
            Ok((sequence, payload)) => {
                report.blocks_read += 1;
                match serde_json::from_slice::<Event>(&payload) {
                    Ok(event) => {
                        apply_event_to_counters(&mut counters, &event);
                        events.push(event);
                        report.events_rebuilt += 1;
                    }
                    Err(e) => {
                        warn!(sequence, error = %e, "block payload is not an event; skipping");
                        report.undecodable_events += 1;
                    }
                }
            }
            Err(ChainError::Integrity { sequence, reason }) => {
                warn!(sequence, reason = %reason, "stopping rebuild at chain break");
                report.chain_break_at = Some(sequence);
                break;
            }
            Err(ChainError::MalformedFrame { offset }) => {
                warn!(offset, "stopping rebuild at undecodable frame");
                report.chain_break_at = Some(report.blocks_read);
                break;
            }
            Err(e) => return Err(DispatchError::Chain(e)),
        }
    }

    mirror.replace_with(&events)?;
    report.counters_updated = store
        .commit(&config.counter_stream, &counters)?
        .is_some();

    info!("{}", report.summary());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use chrono::Utc;
    use chronicle_core::InteractionRecord;
    use tempfile::tempdir;

    fn record(cmd: &str) -> InteractionRecord {
        InteractionRecord {
            cmd: cmd.to_string(),
            args: Vec::new(),
            status: "finished".to_string(),
            result: None,
            error: None,
            job_id: None,
            t_start: Utc::now(),
            t_ack: None,
            t_final: Some(Utc::now()),
        }
    }

    #[test]
    fn test_rebuild_restores_deleted_mirror() {
        let dir = tempdir().unwrap();
        let config = DispatchConfig::new(dir.path());
        let dispatcher = Dispatcher::new(config.clone());
        dispatcher.record(record("run"));
        dispatcher.record(record("login"));

        std::fs::remove_file(config.mirror_path()).unwrap();

        let report = rebuild(&config).unwrap();
        assert_eq!(report.events_rebuilt, 2);
        assert!(report.chain_break_at.is_none());

        let mirror: Vec<Event> = JsonListFile::new(config.mirror_path()).read_all().unwrap();
        assert_eq!(mirror.len(), 2);
        assert_eq!(mirror[1].cmd, "login");
    }

    #[test]
    fn test_rebuilt_counters_match_incremental() {
        let dir = tempdir().unwrap();
        let config = DispatchConfig::new(dir.path());
        let dispatcher = Dispatcher::new(config.clone());
        dispatcher.record(record("run"));
        dispatcher.record(record("login"));
        let mut failed = record("run");
        failed.status = "error".to_string();
        dispatcher.record(failed);

        let store = DeltaStore::open_with(config.state_dir(), config.delta.clone());
        let incremental = store.load(&config.counter_stream).unwrap();

        let report = rebuild(&config).unwrap();
        let rebuilt = store.load(&config.counter_stream).unwrap();
        assert_eq!(incremental, rebuilt);
        assert!(!report.counters_updated, "counters were already correct");
    }

    #[test]
    fn test_rebuild_on_empty_chain_is_clean() {
        let dir = tempdir().unwrap();
        let config = DispatchConfig::new(dir.path());
        let report = rebuild(&config).unwrap();
        assert_eq!(report.blocks_read, 0);
        assert_eq!(report.events_rebuilt, 0);

        let mirror: Vec<Event> = JsonListFile::new(config.mirror_path()).read_all().unwrap();
        assert!(mirror.is_empty());
    }
}
