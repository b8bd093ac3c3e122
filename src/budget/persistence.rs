//! Durable snapshot of the token window.
//!
//! The snapshot is the whole usage history as pretty JSON:
//!
//! ```json
//! {
//!   "usage_history": [
//!     { "timestamp": 1718000000.25, "tokens": 4210 }
//!   ]
//! }
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One observation of token consumption.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    /// Tokens consumed
    pub tokens: u64,
}

impl UsageRecord {
    pub fn new(timestamp: f64, tokens: u64) -> Self {
        Self { timestamp, tokens }
    }
}

/// Errors from reading or writing a tracker snapshot.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for snapshot operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    usage_history: Vec<UsageRecord>,
}

/// File-backed snapshot of usage records.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load records from disk, oldest first.
    ///
    /// A missing file is an empty history, not an error.
    pub fn load(&self) -> PersistenceResult<Vec<UsageRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(PersistenceError::Io(err)),
        };

        let snapshot: Snapshot = serde_json::from_str(&content)?;
        let mut records = snapshot.usage_history;
        // Hand-edited or merged files may be out of order; the window is a FIFO.
        records.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Ok(records)
    }

    /// Replace the snapshot with `records`.
    pub fn save<'a>(&self, records: impl IntoIterator<Item = &'a UsageRecord>) -> PersistenceResult<()> {
        let snapshot = Snapshot {
            usage_history: records.into_iter().copied().collect(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, &self.path)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_loads_empty() {
        let temp_dir = TempDir::new().expect("temp dir");
        let store = SnapshotStore::new(temp_dir.path().join("tokens.json"));
        assert!(store.load().expect("load").is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = TempDir::new().expect("temp dir");
        let store = SnapshotStore::new(temp_dir.path().join("nested/tokens.json"));
        let records = vec![UsageRecord::new(10.5, 400), UsageRecord::new(20.25, 300)];

        store.save(&records).expect("save");
        assert_eq!(store.load().expect("load"), records);
        assert!(!temp_dir.path().join("nested/tokens.json.tmp").exists());
    }

    #[test]
    fn test_snapshot_is_human_readable() {
        let temp_dir = TempDir::new().expect("temp dir");
        let store = SnapshotStore::new(temp_dir.path().join("tokens.json"));
        store.save(&[UsageRecord::new(1.0, 42)]).expect("save");

        let text = fs::read_to_string(store.path()).expect("read");
        assert!(text.contains("\"usage_history\""));
        assert!(text.contains("\"tokens\": 42"));
        assert!(text.contains('\n'));
    }

    #[test]
    fn test_load_sorts_by_timestamp() {
        let temp_dir = TempDir::new().expect("temp dir");
        let path = temp_dir.path().join("tokens.json");
        fs::write(
            &path,
            r#"{"usage_history": [{"timestamp": 30.0, "tokens": 3}, {"timestamp": 10.0, "tokens": 1}]}"#,
        )
        .expect("write");

        let records = SnapshotStore::new(&path).load().expect("load");
        assert_eq!(records[0].tokens, 1);
        assert_eq!(records[1].tokens, 3);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let temp_dir = TempDir::new().expect("temp dir");
        let path = temp_dir.path().join("tokens.json");
        fs::write(&path, "not json").expect("write");

        let err = SnapshotStore::new(&path).load().unwrap_err();
        assert!(matches!(err, PersistenceError::Json(_)));
    }

    #[test]
    fn test_load_rejects_negative_tokens() {
        let temp_dir = TempDir::new().expect("temp dir");
        let path = temp_dir.path().join("tokens.json");
        fs::write(&path, r#"{"usage_history": [{"timestamp": 1.0, "tokens": -5}]}"#)
            .expect("write");

        assert!(SnapshotStore::new(&path).load().is_err());
    }
}
