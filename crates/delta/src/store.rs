//! On-disk delta store
//!
//! Each stream lives in its own directory under the store root:
//!
//! ```text
//! state/
//!   cli_state/
//!     checkpoint_00000000.ckpt   full snapshot
//!     delta_00000001.delta       diff against the state at seq 0
//!     delta_00000002.delta
//!     checkpoint_00000003.ckpt   replay restarts here
//!     delta_00000004.delta
//! ```
//!
//! Sequence numbers are global per stream across both record kinds, so the
//! replay order is total. `load` starts at the newest checkpoint and applies
//! every later delta in order. `commit` appends a delta (no-op when nothing
//! changed) and writes a fresh checkpoint once the replay chain since the
//! last one exceeds the configured record or byte threshold. Files are
//! written via temp + rename and never deleted.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use chronicle_core::{DeltaOptions, Value};

use crate::diff::{apply_diff, diff_states, Diff};
use crate::error::DeltaError;

/// A reconstructed current-state object for one stream
pub type StateSnapshot = HashMap<String, Value>;

const CHECKPOINT_PREFIX: &str = "checkpoint_";
const CHECKPOINT_EXT: &str = "ckpt";
const DELTA_PREFIX: &str = "delta_";
const DELTA_EXT: &str = "delta";

/// Full-snapshot record
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointRecord {
    seq: u64,
    snapshot: StateSnapshot,
}

/// Forward-diff record
#[derive(Debug, Serialize, Deserialize)]
struct DeltaRecord {
    seq: u64,
    base_seq: u64,
    diff: Diff,
}

/// Diff-based state store with periodic checkpoints
pub struct DeltaStore {
    root: PathBuf,
    options: DeltaOptions,
}

/// What `load` found on disk, kept so `commit` can reuse one scan
struct ReplayState {
    snapshot: StateSnapshot,
    /// Highest sequence number seen (checkpoint or delta); None when empty
    last_seq: Option<u64>,
    /// Deltas replayed since the newest checkpoint
    replayed_records: u64,
    /// Bytes of delta files replayed since the newest checkpoint
    replayed_bytes: u64,
}

impl DeltaStore {
    /// Open a delta store rooted at `root` with default options
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self::open_with(root, DeltaOptions::default())
    }

    /// Open a delta store with explicit options
    pub fn open_with(root: impl Into<PathBuf>, options: DeltaOptions) -> Self {
        DeltaStore {
            root: root.into(),
            options,
        }
    }

    /// Directory of one stream
    pub fn stream_dir(&self, stream: &str) -> PathBuf {
        self.root.join(stream)
    }

    /// Reconstruct the current snapshot of `stream`
    ///
    /// A stream with no persisted records loads as an empty snapshot.
    pub fn load(&self, stream: &str) -> Result<StateSnapshot, DeltaError> {
        Ok(self.replay(stream)?.snapshot)
    }

    /// Commit `new_state` as the current state of `stream`
    ///
    /// Computes the forward diff from the reconstructed current state; when
    /// no keys changed this is an idempotent no-op returning `None`.
    /// Otherwise returns the sequence number of the new delta record.
    ///
    /// Records are stored as JSON, which has no representation for
    /// non-finite floats: a committed `NaN` or infinity reloads as `Null`.
    pub fn commit(
        &self,
        stream: &str,
        new_state: &StateSnapshot,
    ) -> Result<Option<u64>, DeltaError> {
        let replay = self.replay(stream)?;
        let diff = diff_states(&replay.snapshot, new_state);
        if diff.is_empty() {
            return Ok(None);
        }

        let dir = self.stream_dir(stream);
        fs::create_dir_all(&dir)?;

        let base_seq = replay.last_seq.map(|s| s + 1).unwrap_or(0);
        // Reserve seq 0 for an initial checkpoint so an empty stream always
        // starts with a full snapshot on disk.
        let (delta_seq, wrote_initial_checkpoint) = if replay.last_seq.is_none() {
            let checkpoint = CheckpointRecord {
                seq: 0,
                snapshot: StateSnapshot::new(),
            };
            write_record(&dir, &checkpoint_name(0), &checkpoint)?;
            (1, true)
        } else {
            (base_seq, false)
        };

        let record = DeltaRecord {
            seq: delta_seq,
            base_seq: delta_seq - 1,
            diff,
        };
        let delta_bytes = write_record(&dir, &delta_name(delta_seq), &record)?;
        debug!(stream, seq = delta_seq, bytes = delta_bytes, "committed delta");

        let replayed_records = if wrote_initial_checkpoint {
            1
        } else {
            replay.replayed_records + 1
        };
        let replayed_bytes = replay.replayed_bytes + delta_bytes;
        if replayed_records >= self.options.checkpoint_every_records
            || replayed_bytes >= self.options.checkpoint_every_bytes
        {
            let checkpoint = CheckpointRecord {
                seq: delta_seq + 1,
                snapshot: new_state.clone(),
            };
            write_record(&dir, &checkpoint_name(delta_seq + 1), &checkpoint)?;
            info!(
                stream,
                seq = delta_seq + 1,
                records = replayed_records,
                bytes = replayed_bytes,
                "wrote checkpoint"
            );
        }

        Ok(Some(delta_seq))
    }

    /// Scan a stream directory: newest checkpoint plus ordered later deltas
    fn replay(&self, stream: &str) -> Result<ReplayState, DeltaError> {
        let dir = self.stream_dir(stream);
        let mut checkpoints: Vec<(u64, PathBuf)> = Vec::new();
        let mut deltas: Vec<(u64, PathBuf)> = Vec::new();

        match fs::read_dir(&dir) {
            Ok(entries) => {
                for entry in entries {
                    let path = entry?.path();
                    if let Some((kind, seq)) = parse_record_name(&path) {
                        match kind {
                            RecordKind::Checkpoint => checkpoints.push((seq, path)),
                            RecordKind::Delta => deltas.push((seq, path)),
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ReplayState {
                    snapshot: StateSnapshot::new(),
                    last_seq: None,
                    replayed_records: 0,
                    replayed_bytes: 0,
                });
            }
            Err(e) => return Err(e.into()),
        }

        checkpoints.sort_by_key(|(seq, _)| *seq);
        deltas.sort_by_key(|(seq, _)| *seq);

        let mut snapshot = StateSnapshot::new();
        let mut last_seq: Option<u64> = None;

        if let Some((seq, path)) = checkpoints.last() {
            let record: CheckpointRecord = read_record(stream, path)?;
            if record.seq != *seq {
                return Err(corrupt(
                    stream,
                    format!(
                        "checkpoint file {} carries sequence {}",
                        path.display(),
                        record.seq
                    ),
                ));
            }
            snapshot = record.snapshot;
            last_seq = Some(*seq);
        }

        let mut replayed_records = 0u64;
        let mut replayed_bytes = 0u64;
        let replay_after = last_seq;

        for (seq, path) in &deltas {
            if let Some(after) = replay_after {
                if *seq <= after {
                    continue; // superseded by the checkpoint
                }
            }
            let record: DeltaRecord = read_record(stream, path)?;
            if record.seq != *seq {
                return Err(corrupt(
                    stream,
                    format!("delta file {} carries sequence {}", path.display(), record.seq),
                ));
            }
            if let Some(prev) = last_seq {
                if record.base_seq != prev {
                    return Err(corrupt(
                        stream,
                        format!(
                            "delta {} expects base {}, but replay is at {}",
                            seq, record.base_seq, prev
                        ),
                    ));
                }
            }
            apply_diff(&mut snapshot, &record.diff).map_err(|e| match e {
                DeltaError::CorruptState { reason, .. } => corrupt(
                    stream,
                    format!("delta {} does not apply: {}", seq, reason),
                ),
                other => other,
            })?;
            last_seq = Some(*seq);
            replayed_records += 1;
            replayed_bytes += fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        }

        Ok(ReplayState {
            snapshot,
            last_seq,
            replayed_records,
            replayed_bytes,
        })
    }
}

enum RecordKind {
    Checkpoint,
    Delta,
}

fn checkpoint_name(seq: u64) -> String {
    format!("{}{:08}.{}", CHECKPOINT_PREFIX, seq, CHECKPOINT_EXT)
}

fn delta_name(seq: u64) -> String {
    format!("{}{:08}.{}", DELTA_PREFIX, seq, DELTA_EXT)
}

fn parse_record_name(path: &Path) -> Option<(RecordKind, u64)> {
    let name = path.file_name()?.to_str()?;
    let (kind, rest) = if let Some(rest) = name.strip_prefix(CHECKPOINT_PREFIX) {
        (RecordKind::Checkpoint, rest.strip_suffix(&format!(".{}", CHECKPOINT_EXT))?)
    } else if let Some(rest) = name.strip_prefix(DELTA_PREFIX) {
        (RecordKind::Delta, rest.strip_suffix(&format!(".{}", DELTA_EXT))?)
    } else {
        return None;
    };
    rest.parse().ok().map(|seq| (kind, seq))
}

/// Serialize a record to `dir/name` via temp file + rename, fsynced
fn write_record<T: Serialize>(dir: &Path, name: &str, record: &T) -> Result<u64, DeltaError> {
    let final_path = dir.join(name);
    let temp_path = dir.join(format!("{}.tmp", name));
    let bytes = serde_json::to_vec_pretty(record)?;
    {
        let mut file = fs::File::create(&temp_path)?;
        std::io::Write::write_all(&mut file, &bytes)?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, &final_path)?;
    Ok(bytes.len() as u64)
}

fn read_record<T: for<'de> Deserialize<'de>>(stream: &str, path: &Path) -> Result<T, DeltaError> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| corrupt(stream, format!("{}: {}", path.display(), e)))
}

fn corrupt(stream: &str, reason: String) -> DeltaError {
    DeltaError::CorruptState {
        stream: stream.to_string(),
        reason,
    }
}
