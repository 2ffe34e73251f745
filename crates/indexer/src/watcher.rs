use crate::cache::HashCache;
use crate::error::{IndexerError, Result};
use crate::scanner::{embed_blocks, normalize_path};
use crate::state::{FileStatus, IndexState};
use crate::{DELETION_DEBOUNCE_MS, MAX_FILE_SIZE_BYTES};
use atlas_code_chunker::{hash_file_content, is_supported_extension, Chunker};
use atlas_vector_store::{Embedder, VectorStore};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;

/// Outcome of one per-file watcher pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingResult {
    Indexed { blocks: usize },
    Skipped { reason: String },
    Removed,
    Failed { error: String },
}

/// Incremental indexer: reacts to create/change/delete events after the
/// initial scan, re-using the scanner's per-file pipeline at single-file
/// granularity.
///
/// Deletions are debounced through a pending buffer so an editor's
/// delete-then-recreate save pattern settles to exactly one record set.
pub struct FileWatcher {
    inner: Arc<WatcherInner>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

struct WatcherInner {
    root: PathBuf,
    chunker: Arc<Chunker>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    cache: Arc<HashCache>,
    state: Arc<IndexState>,
    pending_deletions: Mutex<HashSet<String>>,
}

impl FileWatcher {
    pub fn new(
        root: impl Into<PathBuf>,
        chunker: Arc<Chunker>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        cache: Arc<HashCache>,
        state: Arc<IndexState>,
    ) -> Self {
        Self {
            inner: Arc::new(WatcherInner {
                root: root.into(),
                chunker,
                embedder,
                store,
                cache,
                state,
                pending_deletions: Mutex::new(HashSet::new()),
            }),
            watcher: Mutex::new(None),
            loop_handle: Mutex::new(None),
        }
    }

    /// Subscribe to file events under the workspace root and start the
    /// event loop.
    pub fn initialize(&self) -> Result<()> {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = event_tx.blocking_send(res);
            },
            NotifyConfig::default(),
        )
        .map_err(|e| IndexerError::Other(format!("watcher init failed: {e}")))?;
        watcher
            .watch(&self.inner.root, RecursiveMode::Recursive)
            .map_err(|e| {
                IndexerError::Other(format!(
                    "failed to watch {}: {e}",
                    self.inner.root.display()
                ))
            })?;

        *self.watcher.lock().unwrap() = Some(watcher);
        let inner = self.inner.clone();
        *self.loop_handle.lock().unwrap() = Some(tokio::spawn(run_event_loop(inner, event_rx)));

        log::info!("Watching {} for changes", self.inner.root.display());
        Ok(())
    }

    /// Run the per-file pipeline for one created or changed path.
    pub async fn process_file(&self, path: &Path) -> ProcessingResult {
        self.inner.process_file(path).await
    }

    /// Handle a deletion event: the cache entry goes immediately, the
    /// store delete is parked in the pending buffer for the debounced
    /// flush.
    pub fn mark_deleted(&self, path: &Path) {
        self.inner.mark_deleted(path);
    }

    /// Bulk-delete everything still parked in the pending buffer.
    pub async fn flush_pending_deletions(&self) {
        self.inner.flush_pending_deletions().await;
    }

    #[must_use]
    pub fn pending_deletion_count(&self) -> usize {
        self.inner.pending_deletions.lock().unwrap().len()
    }

    /// Synchronously drop the file-event subscription, stop the event
    /// loop, and best-effort flush pending deletions.
    pub async fn dispose(&self) {
        drop(self.watcher.lock().unwrap().take());
        if let Some(handle) = self.loop_handle.lock().unwrap().take() {
            handle.abort();
        }
        self.inner.flush_pending_deletions().await;
    }
}

async fn run_event_loop(
    inner: Arc<WatcherInner>,
    mut event_rx: mpsc::Receiver<notify::Result<Event>>,
) {
    let mut flush_deadline: Option<time::Instant> = None;

    loop {
        tokio::select! {
            maybe_event = event_rx.recv() => {
                match maybe_event {
                    None => break,
                    Some(Ok(event)) => {
                        inner.handle_event(event).await;
                        flush_deadline = if inner.pending_deletions.lock().unwrap().is_empty() {
                            None
                        } else {
                            Some(time::Instant::now() + Duration::from_millis(DELETION_DEBOUNCE_MS))
                        };
                    }
                    Some(Err(err)) => log::warn!("Watcher error: {err}"),
                }
            }
            () = async {
                if let Some(deadline) = flush_deadline {
                    time::sleep_until(deadline).await;
                }
            }, if flush_deadline.is_some() => {
                inner.flush_pending_deletions().await;
                flush_deadline = None;
            }
        }
    }

    inner.flush_pending_deletions().await;
}

impl WatcherInner {
    async fn handle_event(&self, event: Event) {
        for path in &event.paths {
            if !is_relevant_path(&self.root, path) || !is_supported_extension(path) {
                continue;
            }
            match &event.kind {
                EventKind::Create(_) | EventKind::Modify(_) => {
                    // Rename events arrive as Modify on both ends; the
                    // vanished end is a deletion.
                    let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
                    if exists {
                        let result = self.process_file(path).await;
                        log::debug!("Processed {}: {result:?}", path.display());
                    } else {
                        self.mark_deleted(path);
                    }
                }
                EventKind::Remove(_) => self.mark_deleted(path),
                EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
            }
        }
    }

    async fn process_file(&self, path: &Path) -> ProcessingResult {
        let rel_path = normalize_path(&self.root, path);
        self.state
            .set_file_status(&rel_path, FileStatus::Processing);

        let result = self.run_pipeline(path, &rel_path).await;
        match &result {
            ProcessingResult::Indexed { blocks } => {
                self.state.add_blocks_found(*blocks);
                self.state.add_blocks_processed(*blocks);
                self.state.set_file_status(&rel_path, FileStatus::Indexed);
            }
            ProcessingResult::Skipped { .. } => {
                self.state.set_file_status(&rel_path, FileStatus::Indexed);
            }
            ProcessingResult::Removed => {
                self.state.remove_file_status(&rel_path);
            }
            ProcessingResult::Failed { error } => {
                log::warn!("Failed to index {rel_path}: {error}");
                self.state.set_file_status(&rel_path, FileStatus::Error);
            }
        }
        result
    }

    async fn run_pipeline(&self, path: &Path, rel_path: &str) -> ProcessingResult {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.mark_deleted(path);
                return ProcessingResult::Removed;
            }
            Err(err) => {
                return ProcessingResult::Failed {
                    error: err.to_string(),
                }
            }
        };
        if metadata.len() > MAX_FILE_SIZE_BYTES {
            return ProcessingResult::Skipped {
                reason: "file exceeds size ceiling".into(),
            };
        }

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) => {
                return ProcessingResult::Failed {
                    error: err.to_string(),
                }
            }
        };

        let file_hash = hash_file_content(&content);
        if self.cache.get(rel_path).as_deref() == Some(file_hash.as_str()) {
            return ProcessingResult::Skipped {
                reason: "unchanged".into(),
            };
        }

        let blocks = match self.chunker.parse(rel_path, &content, &file_hash) {
            Ok(blocks) => blocks,
            Err(err) => {
                return ProcessingResult::Failed {
                    error: err.to_string(),
                }
            }
        };

        // The file exists again (or still); a parked deletion for it must
        // not fire after we re-upsert.
        self.pending_deletions.lock().unwrap().remove(rel_path);

        if blocks.is_empty() {
            if let Err(err) = self.store.delete_points_by_file_path(rel_path).await {
                return ProcessingResult::Failed {
                    error: err.to_string(),
                };
            }
            self.cache.delete(rel_path);
            return ProcessingResult::Skipped {
                reason: "no indexable blocks".into(),
            };
        }

        // Delete-then-upsert keeps stale records from surviving next to
        // fresh ones when block boundaries move.
        if let Err(err) = self.store.delete_points_by_file_path(rel_path).await {
            return ProcessingResult::Failed {
                error: err.to_string(),
            };
        }

        let block_count = blocks.len();
        let records = match embed_blocks(&self.root, &self.embedder, &blocks).await {
            Ok(records) => records,
            Err(err) => {
                return ProcessingResult::Failed {
                    error: err.to_string(),
                }
            }
        };
        if let Err(err) = self.store.upsert_points(&records).await {
            return ProcessingResult::Failed {
                error: err.to_string(),
            };
        }

        self.cache.update(rel_path, file_hash);
        ProcessingResult::Indexed {
            blocks: block_count,
        }
    }

    fn mark_deleted(&self, path: &Path) {
        let rel_path = normalize_path(&self.root, path);
        self.cache.delete(&rel_path);
        self.state.remove_file_status(&rel_path);
        self.pending_deletions.lock().unwrap().insert(rel_path);
    }

    async fn flush_pending_deletions(&self) {
        let parked: Vec<String> = {
            let mut pending = self.pending_deletions.lock().unwrap();
            pending.drain().collect()
        };
        if parked.is_empty() {
            return;
        }

        log::debug!("Flushing {} pending deletions", parked.len());
        if let Err(err) = self.store.delete_points_by_file_paths(&parked).await {
            // Best effort: the next scan's reconciliation pass catches
            // anything that slips through here.
            log::warn!("Pending deletion flush failed: {err}");
        }
    }
}

fn is_relevant_path(root: &Path, path: &Path) -> bool {
    const IGNORED: &[&str] = &[
        ".git",
        ".hg",
        ".svn",
        "target",
        "node_modules",
        "dist",
        "build",
        "out",
    ];

    if let Ok(relative) = path.strip_prefix(root) {
        if let Some(first) = relative.components().next() {
            let first = first.as_os_str().to_string_lossy().to_lowercase();
            if IGNORED.iter().any(|ignore| first == *ignore) {
                return false;
            }
        }
    }

    true
}
