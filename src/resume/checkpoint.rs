//! In-process checkpoint store
//!
//! Owns the [`CheckpointState`] for the duration of a crawl. Every mutation
//! and every flush goes through one async mutex, so test-and-claim of a leaf
//! is atomic and a flush always serializes a consistent snapshot.

use crate::metrics;
use crate::resume::state::{CheckpointState, ResumeError};
use crate::LeafKey;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// When the store writes the checkpoint to disk.
///
/// Independently of the policy, the store also flushes whenever the current
/// table changes and whenever [`CheckpointStore::flush`] is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Flush after every newly processed leaf
    EveryRecord,
    /// Flush after every N newly processed leaves
    EveryKeys(usize),
}

impl FlushPolicy {
    /// Flush every `n` keys; `n <= 1` flushes every record.
    pub fn every(n: usize) -> Self {
        if n <= 1 {
            Self::EveryRecord
        } else {
            Self::EveryKeys(n)
        }
    }

    fn threshold(&self) -> usize {
        match self {
            Self::EveryRecord => 1,
            Self::EveryKeys(n) => (*n).max(1),
        }
    }
}

/// Result of trying to claim a leaf for processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The caller now owns the leaf and must mark or release it
    Claimed,
    /// The leaf is already in the checkpoint
    AlreadyProcessed,
    /// Another task is processing the leaf right now
    InFlight,
}

struct StoreInner {
    state: CheckpointState,
    in_flight: HashSet<LeafKey>,
    pending: usize,
}

/// Shared checkpoint of processed leaves and the table in progress
pub struct CheckpointStore {
    path: PathBuf,
    policy: FlushPolicy,
    inner: Mutex<StoreInner>,
}

impl CheckpointStore {
    /// Load the checkpoint at `path`, tolerating a missing or corrupt file.
    pub fn load(path: impl AsRef<Path>, policy: FlushPolicy) -> Self {
        let path = path.as_ref().to_path_buf();
        let state = CheckpointState::load_or_default(&path);
        info!(
            path = %path.display(),
            processed = state.len(),
            current_table_id = ?state.current_table_id(),
            ?policy,
            "Checkpoint store ready"
        );
        Self {
            path,
            policy,
            inner: Mutex::new(StoreInner {
                state,
                in_flight: HashSet::new(),
                pending: 0,
            }),
        }
    }

    /// Checkpoint file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush policy in use
    pub fn policy(&self) -> FlushPolicy {
        self.policy
    }

    /// Copy of the in-memory state
    pub async fn snapshot(&self) -> CheckpointState {
        self.inner.lock().await.state.clone()
    }

    /// Whether a leaf is recorded as processed
    pub async fn is_processed(&self, key: &LeafKey) -> bool {
        self.inner.lock().await.state.is_processed(key)
    }

    /// Number of processed leaves
    pub async fn processed_count(&self) -> usize {
        self.inner.lock().await.state.len()
    }

    /// Reference table in progress
    pub async fn current_table(&self) -> Option<i64> {
        self.inner.lock().await.state.current_table_id()
    }

    /// Atomically test a leaf and claim it for processing.
    pub async fn claim(&self, key: &LeafKey) -> Claim {
        let mut inner = self.inner.lock().await;
        if inner.state.is_processed(key) {
            Claim::AlreadyProcessed
        } else if !inner.in_flight.insert(key.clone()) {
            Claim::InFlight
        } else {
            Claim::Claimed
        }
    }

    /// Give up a claim without marking the leaf (fetch failed, malformed value).
    pub async fn release(&self, key: &LeafKey) {
        self.inner.lock().await.in_flight.remove(key);
    }

    /// Record a leaf as processed, flushing when the policy says so.
    ///
    /// # Returns
    /// Whether the key was newly inserted
    pub async fn mark_processed(&self, key: LeafKey) -> Result<bool, ResumeError> {
        let mut inner = self.inner.lock().await;
        inner.in_flight.remove(&key);
        if !inner.state.insert(key) {
            return Ok(false);
        }
        inner.pending += 1;
        if inner.pending >= self.policy.threshold() {
            self.flush_locked(&mut inner)?;
        }
        Ok(true)
    }

    /// Record the table in progress. A change is flushed immediately.
    pub async fn set_current_table(&self, table_id: Option<i64>) -> Result<(), ResumeError> {
        let mut inner = self.inner.lock().await;
        if inner.state.current_table_id() == table_id {
            return Ok(());
        }
        inner.state.set_current_table(table_id);
        self.flush_locked(&mut inner)
    }

    /// Write the checkpoint now.
    pub async fn flush(&self) -> Result<(), ResumeError> {
        let mut inner = self.inner.lock().await;
        self.flush_locked(&mut inner)
    }

    /// Forget every processed leaf and the table in progress, and persist that.
    pub async fn reset(&self) -> Result<(), ResumeError> {
        let mut inner = self.inner.lock().await;
        inner.state.clear();
        inner.in_flight.clear();
        info!(path = %self.path.display(), "Checkpoint reset");
        self.flush_locked(&mut inner)
    }

    fn flush_locked(&self, inner: &mut StoreInner) -> Result<(), ResumeError> {
        inner.state.save(&self.path)?;
        debug!(
            processed = inner.state.len(),
            pending = inner.pending,
            "Checkpoint flushed"
        );
        inner.pending = 0;
        metrics::record_checkpoint_flush(inner.state.len());
        Ok(())
    }
}
