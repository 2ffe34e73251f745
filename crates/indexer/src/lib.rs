//! # Atlas Indexer
//!
//! Workspace indexing for semantic code search.
//!
//! ## Pipeline
//!
//! ```text
//! Workspace
//!     │
//!     ├──> Directory Scanner (.gitignore aware, hash-cache backed)
//!     │      ├─> Chunker (AST-aware)
//!     │      └─> Embed + upsert in retried batches
//!     │
//!     ├──> File Watcher (create/change/delete, debounced deletes)
//!     │
//!     └──> Index State (observable progress stream)
//! ```
//!
//! The [`IndexOrchestrator`] owns one workspace's scanner, watcher, hash
//! cache, and service handles, and sequences the indexing lifecycle.

mod batching;
mod cache;
mod config;
mod error;
mod orchestrator;
mod registry;
mod scanner;
mod state;
mod stats;
mod watcher;

pub use cache::HashCache;
pub use config::{ConfigDelta, EmbedderConfig, EngineConfig, QdrantConfig};
pub use error::{IndexerError, Result};
pub use orchestrator::IndexOrchestrator;
pub use registry::WorkspaceRegistry;
pub use scanner::{
    walk_workspace, BatchErrorFn, BatchIndexedFn, DirectoryScanner, FileParsedFn, ScanObserver,
};
pub use state::{FileStatus, IndexState, IndexStatus, ProgressSnapshot};
pub use stats::ScanStats;
pub use watcher::{FileWatcher, ProcessingResult};

/// Bounded parallelism for per-file parsing.
pub const PARSING_CONCURRENCY: usize = 10;
/// Bounded parallelism for batch embed/upsert work.
pub const BATCH_PROCESSING_CONCURRENCY: usize = 10;
/// Blocks accumulated before a batch is cut.
pub const BATCH_SEGMENT_THRESHOLD: usize = 30;
/// Attempts per batch, including the first.
pub const MAX_BATCH_RETRIES: usize = 3;
/// Base delay for exponential batch backoff.
pub const INITIAL_RETRY_DELAY_MS: u64 = 500;
/// Files above this size are skipped.
pub const MAX_FILE_SIZE_BYTES: u64 = 1024 * 1024;
/// Total token estimate allowed in one embedding request.
pub const MAX_BATCH_TOKENS: usize = 100_000;
/// Token estimate allowed for a single embedding input.
pub const MAX_ITEM_TOKENS: usize = 8_191;
/// Debounce window for hash-cache persistence.
pub const CACHE_DEBOUNCE_MS: u64 = 500;
/// Debounce window before pending deletions are flushed to the store.
pub const DELETION_DEBOUNCE_MS: u64 = 500;
/// Project-specific ignore file honored next to `.gitignore`.
pub const PROJECT_IGNORE_FILE: &str = ".atlasignore";
