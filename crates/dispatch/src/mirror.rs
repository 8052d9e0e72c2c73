//! Human-readable mirror and error channel files
//!
//! Both `events.json` and `errors.json` are single ordered JSON arrays,
//! chosen for direct inspection with any JSON tool. Appending rewrites the
//! file through a temp file + atomic rename, so readers never observe a
//! half-written array. An existing file that fails to parse is treated as
//! lost and restarted — these files are derived views; the chain log is the
//! authority and [`rebuild`](crate::rebuild) regenerates them.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

/// Errors from the mirror / error channel writer
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Underlying I/O failure; the append did not happen
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Record serialization failure
    #[error("record encoding failure: {0}")]
    Encode(#[from] serde_json::Error),
}

/// An append-only list of records stored as one JSON array on disk
#[derive(Debug, Clone)]
pub struct JsonListFile {
    path: PathBuf,
}

impl JsonListFile {
    /// Bind to `path`; the file is created on first append
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonListFile { path: path.into() }
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all records, tolerating a missing or unparseable file
    pub fn read_all<T: DeserializeOwned>(&self) -> Result<Vec<T>, MirrorError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Vec::new());
        }
        match serde_json::from_slice(&bytes) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "mirror file unparseable; starting a fresh list"
                );
                Ok(Vec::new())
            }
        }
    }

    /// Append one record, rewriting the array atomically
    pub fn append<T: Serialize + DeserializeOwned>(&self, record: &T) -> Result<(), MirrorError> {
        let mut records: Vec<serde_json::Value> = self.read_all()?;
        records.push(serde_json::to_value(record)?);
        self.replace_with(&records)
    }

    /// Replace the whole list (used by rebuild)
    pub fn replace_with<T: Serialize>(&self, records: &[T]) -> Result<(), MirrorError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let temp_path = self.path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(records)?;
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempdir().unwrap();
        let list = JsonListFile::new(dir.path().join("events.json"));
        let records: Vec<serde_json::Value> = list.read_all().unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_append_preserves_order() {
        let dir = tempdir().unwrap();
        let list = JsonListFile::new(dir.path().join("events.json"));
        list.append(&serde_json::json!({"n": 1})).unwrap();
        list.append(&serde_json::json!({"n": 2})).unwrap();
        list.append(&serde_json::json!({"n": 3})).unwrap();

        let records: Vec<serde_json::Value> = list.read_all().unwrap();
        let ns: Vec<_> = records.iter().map(|r| r["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![1, 2, 3]);
    }

    #[test]
    fn test_file_is_one_json_array() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.json");
        let list = JsonListFile::new(&path);
        list.append(&serde_json::json!({"n": 1})).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert!(parsed.is_array());
    }

    #[test]
    fn test_corrupt_file_restarts_list() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.json");
        fs::write(&path, b"{ definitely not an array").unwrap();

        let list = JsonListFile::new(&path);
        list.append(&serde_json::json!({"n": 1})).unwrap();
        let records: Vec<serde_json::Value> = list.read_all().unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = tempdir().unwrap();
        let list = JsonListFile::new(dir.path().join("events.json"));
        list.append(&serde_json::json!({"n": 1})).unwrap();
        assert!(!dir.path().join("events.tmp").exists());
    }
}
