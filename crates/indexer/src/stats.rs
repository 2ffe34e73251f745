use serde::{Deserialize, Serialize};

/// Counters returned by one scan pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanStats {
    /// Files parsed this pass (changed or newly seen).
    pub processed_files: usize,
    /// Files left alone: unchanged hash or above the size ceiling.
    pub skipped_files: usize,
    /// Blocks discovered across all parsed files.
    pub total_blocks: usize,
    /// Blocks embedded and upserted by successful batches.
    pub indexed_blocks: usize,
    /// Per-file and per-batch failures (scan continued past them).
    pub errors: Vec<String>,
    pub time_ms: u64,
}

impl ScanStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }
}
