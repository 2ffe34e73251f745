use crate::cache::HashCache;
use crate::config::{ConfigDelta, EngineConfig};
use crate::error::{IndexerError, Result};
use crate::scanner::{DirectoryScanner, ScanObserver};
use crate::state::{FileStatus, IndexState, IndexStatus};
use crate::stats::ScanStats;
use crate::watcher::FileWatcher;
use atlas_code_chunker::{Chunker, ChunkerConfig};
use atlas_vector_store::{Embedder, VectorStore};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;

/// Top-level coordinator for one workspace.
///
/// Owns the scanner, watcher, hash cache, and service handles, sequences
/// `initialize → bootstrap → scan → watch`, and is the unit of restart
/// when configuration changes. Constructed per workspace; holds no global
/// state (the host's [`crate::WorkspaceRegistry`] maps workspaces to
/// engines).
pub struct IndexOrchestrator {
    root: PathBuf,
    chunker: Arc<Chunker>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    cache: Arc<HashCache>,
    state: Arc<IndexState>,
    watcher: TokioMutex<Option<FileWatcher>>,
    indexing: AtomicBool,
}

impl IndexOrchestrator {
    pub async fn new(
        root: impl AsRef<Path>,
        storage_root: impl AsRef<Path>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            return Err(IndexerError::InvalidPath(format!(
                "Path does not exist: {}",
                root.display()
            )));
        }

        let cache_path = HashCache::cache_file_path(storage_root.as_ref(), &root);
        let cache = HashCache::load(cache_path).await;

        Ok(Self {
            root,
            chunker: Arc::new(Chunker::new(ChunkerConfig::for_embeddings())),
            embedder,
            store,
            cache,
            state: Arc::new(IndexState::new()),
            watcher: TokioMutex::new(None),
            indexing: AtomicBool::new(false),
        })
    }

    /// Build an engine from host configuration. Configuration errors fail
    /// fast here and leave nothing to roll back.
    pub async fn from_config(root: impl AsRef<Path>, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let embedder = config.build_embedder()?;
        let store = config.build_store(root.as_ref())?;
        let storage_root = config.resolve_storage_root()?;
        Self::new(root, storage_root, embedder, store).await
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn state(&self) -> Arc<IndexState> {
        self.state.clone()
    }

    #[must_use]
    pub fn cache(&self) -> Arc<HashCache> {
        self.cache.clone()
    }

    /// Run the full indexing sequence: collection bootstrap, bulk scan,
    /// then the live watcher. Re-entrant calls while a scan is in flight
    /// are rejected, not queued.
    pub async fn start_indexing(&self) -> Result<ScanStats> {
        if self
            .indexing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(IndexerError::AlreadyIndexing);
        }

        let result = self.run_indexing().await;
        self.indexing.store(false, Ordering::SeqCst);

        match result {
            Ok(stats) => {
                self.state.set_status(
                    IndexStatus::Indexed,
                    format!(
                        "Indexed {} files ({} blocks)",
                        stats.processed_files, stats.indexed_blocks
                    ),
                );
                Ok(stats)
            }
            Err(err) => {
                log::error!("Indexing failed for {}: {err}", self.root.display());
                // Best-effort rollback; a half-populated index would
                // otherwise look healthy to the next scan.
                if let Err(clear_err) = self.store.clear_collection().await {
                    log::warn!("Rollback clear failed: {clear_err}");
                }
                if let Err(cache_err) = self.cache.clear().await {
                    log::warn!("Rollback cache clear failed: {cache_err}");
                }
                self.state.set_status(IndexStatus::Error, err.to_string());
                Err(err)
            }
        }
    }

    async fn run_indexing(&self) -> Result<ScanStats> {
        self.state.reset_progress();
        self.state
            .set_status(IndexStatus::Indexing, "Bootstrapping vector collection");

        let created_new = self.store.initialize().await?;
        if created_new && !self.cache.is_empty() {
            // A fresh collection holds no vectors; cached hashes would
            // wrongly report those files as already indexed.
            self.cache.clear().await?;
        }

        self.state.set_message("Scanning workspace");
        let scanner = DirectoryScanner::new(
            self.root.clone(),
            self.chunker.clone(),
            self.embedder.clone(),
            self.store.clone(),
            self.cache.clone(),
        );
        let stats = scanner.scan(&self.scan_observer()).await?;

        self.start_watcher().await?;
        Ok(stats)
    }

    fn scan_observer(&self) -> ScanObserver {
        let state = self.state.clone();
        let on_file_parsed: crate::FileParsedFn = {
            let state = state.clone();
            Arc::new(move |path: &str, blocks: usize| {
                state.set_file_status(path, FileStatus::Processing);
                state.add_blocks_found(blocks);
            })
        };
        let on_batch_indexed: crate::BatchIndexedFn = {
            let state = state.clone();
            Arc::new(move |paths: &[String], blocks: usize| {
                for path in paths {
                    state.set_file_status(path, FileStatus::Indexed);
                }
                state.add_blocks_processed(blocks);
            })
        };
        let on_batch_error: crate::BatchErrorFn =
            Arc::new(move |paths: &[String], error: &str| {
                for path in paths {
                    state.set_file_status(path, FileStatus::Error);
                }
                state.set_message(error.to_string());
            });

        ScanObserver {
            on_file_parsed: Some(on_file_parsed),
            on_batch_indexed: Some(on_batch_indexed),
            on_batch_error: Some(on_batch_error),
        }
    }

    async fn start_watcher(&self) -> Result<()> {
        let mut slot = self.watcher.lock().await;
        if let Some(previous) = slot.take() {
            previous.dispose().await;
        }

        let watcher = FileWatcher::new(
            self.root.clone(),
            self.chunker.clone(),
            self.embedder.clone(),
            self.store.clone(),
            self.cache.clone(),
            self.state.clone(),
        );
        watcher.initialize()?;
        *slot = Some(watcher);
        Ok(())
    }

    /// Stop watching file events. Safe to call when no watcher is running.
    pub async fn stop_watcher(&self) {
        if let Some(watcher) = self.watcher.lock().await.take() {
            watcher.dispose().await;
        }
    }

    /// Stop the watcher, drop the vector collection, empty the hash
    /// cache, and return to `Standby`.
    pub async fn clear_index_data(&self) -> Result<()> {
        self.stop_watcher().await;

        if let Err(err) = self.store.delete_collection().await {
            log::warn!("Failed to delete vector collection: {err}");
        }
        self.cache.clear().await?;

        self.state.reset_progress();
        self.state
            .set_status(IndexStatus::Standby, "Index data cleared");
        Ok(())
    }

    /// React to a freshly loaded host configuration.
    pub async fn apply_configuration(&self, delta: ConfigDelta) -> Result<()> {
        if delta.requires_clear {
            self.clear_index_data().await?;
        }
        if delta.requires_restart {
            self.stop_watcher().await;
            self.start_indexing().await?;
        }
        Ok(())
    }

    /// Release watcher resources and persist any pending cache writes.
    pub async fn dispose(&self) {
        self.stop_watcher().await;
        if let Err(err) = self.cache.flush().await {
            log::warn!("Cache flush on dispose failed: {err}");
        }
    }
}
