use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;
use tokio::sync::watch;

/// System-level indexing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Standby,
    Indexing,
    Indexed,
    Error,
}

impl IndexStatus {
    /// Search is allowed mid-scan; partial results beat no results.
    #[must_use]
    pub fn is_queryable(self) -> bool {
        matches!(self, Self::Indexing | Self::Indexed)
    }
}

/// Per-file indexing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Processing,
    Indexed,
    Error,
}

/// One immutable progress observation. Consumers only ever see whole
/// snapshots; partial mutations never escape the state machine.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub status: IndexStatus,
    pub message: String,
    pub file_statuses: HashMap<String, FileStatus>,
    pub processed_blocks: usize,
    pub total_blocks: usize,
    pub timestamp_unix_ms: u64,
}

impl ProgressSnapshot {
    fn initial() -> Self {
        Self {
            status: IndexStatus::Standby,
            message: String::new(),
            file_statuses: HashMap::new(),
            processed_blocks: 0,
            total_blocks: 0,
            timestamp_unix_ms: current_unix_ms(),
        }
    }
}

/// Owner of all indexing status. Components report into it; it publishes
/// whole snapshots on a watch channel with monotonically non-decreasing
/// timestamps.
pub struct IndexState {
    inner: Mutex<Inner>,
    tx: watch::Sender<ProgressSnapshot>,
}

struct Inner {
    snapshot: ProgressSnapshot,
    // send() fails once every receiver is gone; hold one open.
    _rx: watch::Receiver<ProgressSnapshot>,
}

impl IndexState {
    pub fn new() -> Self {
        let snapshot = ProgressSnapshot::initial();
        let (tx, rx) = watch::channel(snapshot.clone());
        Self {
            inner: Mutex::new(Inner {
                snapshot,
                _rx: rx,
            }),
            tx,
        }
    }

    /// Subscribe to the progress stream. Dropping the receiver never
    /// affects the engine.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.inner.lock().unwrap().snapshot.clone()
    }

    #[must_use]
    pub fn status(&self) -> IndexStatus {
        self.inner.lock().unwrap().snapshot.status
    }

    pub fn set_status(&self, status: IndexStatus, message: impl Into<String>) {
        self.mutate(|snap| {
            snap.status = status;
            snap.message = message.into();
        });
    }

    /// Per-file updates keep the system state as-is.
    pub fn set_file_status(&self, path: &str, status: FileStatus) {
        self.mutate(|snap| {
            snap.file_statuses.insert(path.to_string(), status);
        });
    }

    /// Forget a file entirely, e.g. after it is deleted from disk.
    pub fn remove_file_status(&self, path: &str) {
        self.mutate(|snap| {
            snap.file_statuses.remove(path);
        });
    }

    pub fn add_blocks_found(&self, count: usize) {
        self.mutate(|snap| snap.total_blocks += count);
    }

    pub fn add_blocks_processed(&self, count: usize) {
        self.mutate(|snap| snap.processed_blocks += count);
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.mutate(|snap| snap.message = message.into());
    }

    /// Drop per-file statuses and counters, e.g. when a fresh scan starts
    /// or the index is cleared.
    pub fn reset_progress(&self) {
        self.mutate(|snap| {
            snap.file_statuses.clear();
            snap.processed_blocks = 0;
            snap.total_blocks = 0;
        });
    }

    fn mutate(&self, apply: impl FnOnce(&mut ProgressSnapshot)) {
        let mut inner = self.inner.lock().unwrap();
        apply(&mut inner.snapshot);
        inner.snapshot.timestamp_unix_ms =
            current_unix_ms().max(inner.snapshot.timestamp_unix_ms);
        let _ = self.tx.send(inner.snapshot.clone());
    }
}

impl Default for IndexState {
    fn default() -> Self {
        Self::new()
    }
}

fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|dur| dur.as_millis() as u64)
        .unwrap_or(0)
}
