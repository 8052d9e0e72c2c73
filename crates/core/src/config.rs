//! Configuration for the persistence engines
//!
//! Every knob the engines consume lives here as an explicit struct field:
//! base directory, sensitive-key list, checkpoint thresholds. Nothing is
//! hard-coded into engine logic, and nothing is process-global.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Default sensitive key names (matched case-insensitively)
pub const DEFAULT_SENSITIVE_KEYS: &[&str] = &[
    "password",
    "token",
    "session_token",
    "access_token",
    "refresh_token",
    "secret",
    "key",
    "credential",
    "authorization",
    "login_password",
];

/// Marker written in place of redacted values
pub const REDACTION_MARKER: &str = "<redacted>";

/// Options for the chain log engine
#[derive(Debug, Clone)]
pub struct ChainOptions {
    /// File name of the chain log inside the base directory
    pub file_name: String,
    /// How many times to retry acquiring the cross-process append lock
    pub lock_retries: u32,
    /// Delay between lock acquisition attempts, in milliseconds
    pub lock_retry_delay_ms: u64,
    /// zstd compression level for new blocks
    pub compression_level: i32,
}

impl Default for ChainOptions {
    fn default() -> Self {
        ChainOptions {
            file_name: "events.chain".to_string(),
            lock_retries: 50,
            lock_retry_delay_ms: 20,
            compression_level: 3,
        }
    }
}

/// Options for the delta store engine
#[derive(Debug, Clone)]
pub struct DeltaOptions {
    /// Directory (inside the base directory) holding per-stream state
    pub dir_name: String,
    /// Write a checkpoint once this many deltas follow the last one
    pub checkpoint_every_records: u64,
    /// Write a checkpoint once the replay chain exceeds this many bytes
    pub checkpoint_every_bytes: u64,
}

impl Default for DeltaOptions {
    fn default() -> Self {
        DeltaOptions {
            dir_name: "state".to_string(),
            checkpoint_every_records: 64,
            checkpoint_every_bytes: 256 * 1024,
        }
    }
}

/// Configuration for the event dispatcher
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Base directory for every persisted artifact
    pub base_dir: PathBuf,
    /// Sensitive key names, matched case-insensitively at any depth
    pub sensitive_keys: HashSet<String>,
    /// Positional argument indices to redact, per command name
    pub sensitive_command_args: HashMap<String, Vec<usize>>,
    /// Name of the delta stream carrying usage counters
    pub counter_stream: String,
    /// Agent version stamped into events
    pub agent_version: String,
    /// Chain log options
    pub chain: ChainOptions,
    /// Delta store options
    pub delta: DeltaOptions,
}

impl DispatchConfig {
    /// Build a config rooted at `base_dir` with default knobs
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let mut sensitive_command_args = HashMap::new();
        // The credential is the first positional argument of both login forms.
        sensitive_command_args.insert("login".to_string(), vec![0]);
        sensitive_command_args.insert("login_password".to_string(), vec![0]);

        DispatchConfig {
            base_dir: base_dir.into(),
            sensitive_keys: DEFAULT_SENSITIVE_KEYS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            sensitive_command_args,
            counter_stream: "cli_state".to_string(),
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            chain: ChainOptions::default(),
            delta: DeltaOptions::default(),
        }
    }

    /// Replace the sensitive key set
    pub fn with_sensitive_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sensitive_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Override the checkpoint record threshold
    pub fn with_checkpoint_every(mut self, records: u64) -> Self {
        self.delta.checkpoint_every_records = records;
        self
    }

    /// Path of the chain log file
    pub fn chain_path(&self) -> PathBuf {
        self.base_dir.join(&self.chain.file_name)
    }

    /// Path of the human-readable mirror file
    pub fn mirror_path(&self) -> PathBuf {
        self.base_dir.join("events.json")
    }

    /// Path of the error channel file
    pub fn errors_path(&self) -> PathBuf {
        self.base_dir.join("errors.json")
    }

    /// Directory holding delta store streams
    pub fn state_dir(&self) -> PathBuf {
        self.base_dir.join(&self.delta.dir_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_keys_include_credentials() {
        let cfg = DispatchConfig::new("/tmp/x");
        assert!(cfg.sensitive_keys.contains("password"));
        assert!(cfg.sensitive_keys.contains("session_token"));
        assert!(cfg.sensitive_keys.contains("login_password"));
    }

    #[test]
    fn test_paths_derive_from_base_dir() {
        let cfg = DispatchConfig::new("/data/obs");
        assert_eq!(cfg.chain_path(), PathBuf::from("/data/obs/events.chain"));
        assert_eq!(cfg.mirror_path(), PathBuf::from("/data/obs/events.json"));
        assert_eq!(cfg.errors_path(), PathBuf::from("/data/obs/errors.json"));
        assert_eq!(cfg.state_dir(), PathBuf::from("/data/obs/state"));
    }

    #[test]
    fn test_builder_overrides() {
        let cfg = DispatchConfig::new("/tmp/x")
            .with_sensitive_keys(["apikey"])
            .with_checkpoint_every(4);
        assert!(cfg.sensitive_keys.contains("apikey"));
        assert!(!cfg.sensitive_keys.contains("password"));
        assert_eq!(cfg.delta.checkpoint_every_records, 4);
    }
}
