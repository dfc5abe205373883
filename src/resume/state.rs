//! Checkpoint state persistence
//!
//! The checkpoint is a single JSON document holding every processed leaf key
//! and the reference table in progress. Writes are atomic (temp file, fsync,
//! rename, directory fsync) and coordinated through an fd-lock on a sibling
//! `.lock` file.

use crate::LeafKey;
use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Current checkpoint schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Maximum checkpoint file size accepted on load (512 MiB).
pub const MAX_STATE_FILE_SIZE: u64 = 512 * 1024 * 1024;

/// Persisted crawl progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    schema_version: String,
    processed_keys: BTreeSet<LeafKey>,
    #[serde(default)]
    current_table_id: Option<i64>,
    saved_at: DateTime<Utc>,
}

impl Default for CheckpointState {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointState {
    /// Empty state
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            processed_keys: BTreeSet::new(),
            current_table_id: None,
            saved_at: Utc::now(),
        }
    }

    /// Schema version recorded in the state
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Processed leaf keys, sorted
    pub fn processed_keys(&self) -> &BTreeSet<LeafKey> {
        &self.processed_keys
    }

    /// Whether a leaf has been processed
    pub fn is_processed(&self, key: &LeafKey) -> bool {
        self.processed_keys.contains(key)
    }

    /// Number of processed leaves
    pub fn len(&self) -> usize {
        self.processed_keys.len()
    }

    /// Whether no leaf has been processed
    pub fn is_empty(&self) -> bool {
        self.processed_keys.is_empty()
    }

    /// Reference table in progress
    pub fn current_table_id(&self) -> Option<i64> {
        self.current_table_id
    }

    /// Time of the last save
    pub fn saved_at(&self) -> DateTime<Utc> {
        self.saved_at
    }

    pub(crate) fn insert(&mut self, key: LeafKey) -> bool {
        self.processed_keys.insert(key)
    }

    pub(crate) fn set_current_table(&mut self, table_id: Option<i64>) {
        self.current_table_id = table_id;
    }

    pub(crate) fn clear(&mut self) {
        self.processed_keys.clear();
        self.current_table_id = None;
    }

    /// Save state to file with atomic writes and file locking.
    ///
    /// Stamps `saved_at` on the written copy.
    pub fn save(&mut self, path: &Path) -> Result<(), ResumeError> {
        self.saved_at = Utc::now();
        debug!(
            path = %path.display(),
            processed = self.processed_keys.len(),
            "Saving checkpoint"
        );

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ResumeError::IoError(e.to_string()))?;
        }

        let lock_path = path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| ResumeError::LockError(format!("Failed to create lock file: {e}")))?;

        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire write lock: {e}")))?;

        let parent_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| ResumeError::IoError(format!("Failed to create temp file: {e}")))?;

        let mut writer = BufWriter::new(temp_file);
        serde_json::to_writer(&mut writer, self).map_err(|e| ResumeError::SerializationError(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
        let temp_file = writer
            .into_inner()
            .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| ResumeError::IoError(format!("Failed to sync temp file: {e}")))?;

        temp_file
            .persist(path)
            .map_err(|e| ResumeError::IoError(format!("Failed to persist temp file: {e}")))?;

        if let Ok(dir) = std::fs::File::open(parent_dir) {
            let _ = dir.sync_all();
        }

        debug!(
            path = %path.display(),
            processed = self.processed_keys.len(),
            current_table_id = ?self.current_table_id,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Load state from file with locking.
    ///
    /// # Errors
    /// [`ResumeError::NotFound`] when no checkpoint exists, otherwise the
    /// lock, size, parse or schema problem encountered.
    pub fn load(path: &Path) -> Result<Self, ResumeError> {
        debug!(path = %path.display(), "Loading checkpoint");

        if !path.exists() {
            return Err(ResumeError::NotFound(path.display().to_string()));
        }

        let lock_path = path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| ResumeError::LockError(format!("Failed to create lock file: {e}")))?;

        let lock = RwLock::new(lock_file);
        let _guard = lock
            .read()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire read lock: {e}")))?;

        let metadata = std::fs::metadata(path).map_err(|e| ResumeError::IoError(e.to_string()))?;
        if metadata.len() > MAX_STATE_FILE_SIZE {
            return Err(ResumeError::StateTooLarge {
                size: metadata.len(),
                max: MAX_STATE_FILE_SIZE,
            });
        }

        let contents = std::fs::read_to_string(path).map_err(|e| ResumeError::IoError(e.to_string()))?;
        let state: CheckpointState =
            serde_json::from_str(&contents).map_err(|e| ResumeError::DeserializationError(e.to_string()))?;

        if state.schema_version != SCHEMA_VERSION {
            return Err(ResumeError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: state.schema_version,
            });
        }

        info!(
            processed = state.processed_keys.len(),
            current_table_id = ?state.current_table_id,
            "Checkpoint loaded"
        );
        Ok(state)
    }

    /// Load state, falling back to an empty one.
    ///
    /// A missing, unreadable or corrupt checkpoint is never fatal: the crawl
    /// starts over from nothing and a warning is logged.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(state) => state,
            Err(ResumeError::NotFound(_)) => {
                warn!(path = %path.display(), "No checkpoint found, starting with an empty one");
                Self::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Checkpoint unreadable, starting with an empty one");
                Self::new()
            }
        }
    }
}

/// Checkpoint errors
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// No checkpoint file at the path
    #[error("checkpoint not found: {0}")]
    NotFound(String),

    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected version
        expected: String,
        /// Found version
        found: String,
    },

    /// State file exceeds maximum allowed size
    #[error("state file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}
