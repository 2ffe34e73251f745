use crate::batching::pack_by_token_budget;
use crate::cache::HashCache;
use crate::error::Result;
use crate::stats::ScanStats;
use crate::{
    BATCH_PROCESSING_CONCURRENCY, BATCH_SEGMENT_THRESHOLD, INITIAL_RETRY_DELAY_MS,
    MAX_BATCH_RETRIES, MAX_FILE_SIZE_BYTES, PARSING_CONCURRENCY, PROJECT_IGNORE_FILE,
};
use atlas_code_chunker::{hash_file_content, is_supported_extension, Chunker, CodeBlock};
use atlas_vector_store::{point_id, Embedder, RecordPayload, VectorRecord, VectorStore};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

pub type FileParsedFn = Arc<dyn Fn(&str, usize) + Send + Sync>;
pub type BatchIndexedFn = Arc<dyn Fn(&[String], usize) + Send + Sync>;
pub type BatchErrorFn = Arc<dyn Fn(&[String], &str) + Send + Sync>;

/// Progress callbacks wired by the orchestrator into the state machine.
#[derive(Default, Clone)]
pub struct ScanObserver {
    /// `(relative path, block count)` after a file is parsed.
    pub on_file_parsed: Option<FileParsedFn>,
    /// `(paths in batch, block count)` after a batch commits.
    pub on_batch_indexed: Option<BatchIndexedFn>,
    /// `(paths in batch, error)` after a batch exhausts its retries.
    pub on_batch_error: Option<BatchErrorFn>,
}

impl ScanObserver {
    fn file_parsed(&self, path: &str, blocks: usize) {
        if let Some(f) = &self.on_file_parsed {
            f(path, blocks);
        }
    }

    fn batch_indexed(&self, paths: &[String], blocks: usize) {
        if let Some(f) = &self.on_batch_indexed {
            f(paths, blocks);
        }
    }

    fn batch_error(&self, paths: &[String], error: &str) {
        if let Some(f) = &self.on_batch_error {
            f(paths, error);
        }
    }
}

/// Enumerate indexable files under `root`: gitignore rules plus the
/// project ignore file, filtered to the supported-extension allow-list.
pub fn walk_workspace(root: &Path) -> Vec<PathBuf> {
    let mut builder = ignore::WalkBuilder::new(root);
    builder
        .add_custom_ignore_filename(PROJECT_IGNORE_FILE)
        .hidden(true)
        .follow_links(false)
        // honor .gitignore even in workspaces that are not git checkouts
        .require_git(false);

    let mut files = Vec::new();
    for entry in builder.build().flatten() {
        let is_file = entry
            .file_type()
            .map(|file_type| file_type.is_file())
            .unwrap_or(false);
        if is_file && is_supported_extension(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    files
}

/// Bulk indexer: walks the tree once, chunks changed files, embeds and
/// upserts in bounded-concurrency batches, and reconciles deletions
/// against the previous cache snapshot.
pub struct DirectoryScanner {
    root: PathBuf,
    chunker: Arc<Chunker>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    cache: Arc<HashCache>,
}

/// What one parse worker learned about one file.
enum ParseOutcome {
    Parsed {
        rel_path: String,
        file_hash: String,
        previously_indexed: bool,
        blocks: Vec<CodeBlock>,
    },
    Unchanged,
    TooLarge {
        rel_path: String,
    },
    Failed {
        rel_path: String,
        error: String,
    },
}

/// One unit of batch work, retried as a whole.
struct Batch {
    blocks: Vec<CodeBlock>,
    /// Paths whose stale vectors must be deleted before the upsert. The
    /// coordinator lists a modified file in only its first batch so a
    /// later batch never wipes freshly upserted records.
    delete_paths: Vec<String>,
    /// `path → file hash` committed to the cache on success.
    file_hashes: HashMap<String, String>,
}

struct BatchOutcome {
    paths: Vec<String>,
    blocks: usize,
    result: std::result::Result<HashMap<String, String>, String>,
}

impl DirectoryScanner {
    pub fn new(
        root: impl Into<PathBuf>,
        chunker: Arc<Chunker>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        cache: Arc<HashCache>,
    ) -> Self {
        Self {
            root: root.into(),
            chunker,
            embedder,
            store,
            cache,
        }
    }

    /// Run one full scan pass. Per-file and per-batch failures are soft:
    /// they are reported and counted while the scan continues. An `Err`
    /// here means the pipeline itself is unusable (e.g. the vector store
    /// rejected the reconciliation delete).
    pub async fn scan(&self, observer: &ScanObserver) -> Result<ScanStats> {
        let started = Instant::now();
        let mut stats = ScanStats::new();

        let files = walk_workspace(&self.root);
        let previous = self.cache.snapshot();
        log::info!(
            "Scanning {} ({} candidate files, {} cached)",
            self.root.display(),
            files.len(),
            previous.len()
        );

        let visited: HashSet<String> = files
            .iter()
            .map(|path| normalize_path(&self.root, path))
            .collect();

        let (outcome_tx, mut outcome_rx) = mpsc::channel::<ParseOutcome>(PARSING_CONCURRENCY * 2);
        self.spawn_parse_workers(&files, &previous, outcome_tx);

        // Coordinator: the only writer of the batch buffer. Parse workers
        // hand their blocks over the channel, so no lock is needed here.
        let batch_sem = Arc::new(Semaphore::new(BATCH_PROCESSING_CONCURRENCY));
        let mut batch_tasks: Vec<JoinHandle<BatchOutcome>> = Vec::new();
        let mut buffer: Vec<CodeBlock> = Vec::new();
        let mut buffer_deletes: Vec<String> = Vec::new();
        let mut buffer_hashes: HashMap<String, String> = HashMap::new();
        let mut delete_scheduled: HashSet<String> = HashSet::new();

        while let Some(outcome) = outcome_rx.recv().await {
            match outcome {
                ParseOutcome::Parsed {
                    rel_path,
                    file_hash,
                    previously_indexed,
                    blocks,
                } => {
                    stats.processed_files += 1;
                    stats.total_blocks += blocks.len();
                    observer.file_parsed(&rel_path, blocks.len());

                    if blocks.is_empty() {
                        // Nothing embeddable; a stale entry would otherwise
                        // keep resurrecting old vectors for this file.
                        if previously_indexed {
                            self.store.delete_points_by_file_path(&rel_path).await?;
                            self.cache.delete(&rel_path);
                        }
                        continue;
                    }

                    if previously_indexed && delete_scheduled.insert(rel_path.clone()) {
                        buffer_deletes.push(rel_path.clone());
                    }
                    buffer_hashes.insert(rel_path, file_hash);
                    buffer.extend(blocks);

                    if buffer.len() >= BATCH_SEGMENT_THRESHOLD {
                        let batch = Batch {
                            blocks: std::mem::take(&mut buffer),
                            delete_paths: std::mem::take(&mut buffer_deletes),
                            file_hashes: std::mem::take(&mut buffer_hashes),
                        };
                        batch_tasks.push(self.spawn_batch(batch, batch_sem.clone()));
                    }
                }
                ParseOutcome::Unchanged => stats.skipped_files += 1,
                ParseOutcome::TooLarge { rel_path } => {
                    log::debug!("Skipping oversized file {rel_path}");
                    stats.skipped_files += 1;
                }
                ParseOutcome::Failed { rel_path, error } => {
                    log::warn!("Failed to process {rel_path}: {error}");
                    stats.add_error(format!("{rel_path}: {error}"));
                }
            }
        }

        if !buffer.is_empty() {
            let batch = Batch {
                blocks: buffer,
                delete_paths: buffer_deletes,
                file_hashes: buffer_hashes,
            };
            batch_tasks.push(self.spawn_batch(batch, batch_sem.clone()));
        }

        for task in batch_tasks {
            match task.await {
                Ok(outcome) => match outcome.result {
                    Ok(hashes) => {
                        stats.indexed_blocks += outcome.blocks;
                        for (path, hash) in hashes {
                            self.cache.update(path, hash);
                        }
                        observer.batch_indexed(&outcome.paths, outcome.blocks);
                    }
                    Err(error) => {
                        stats.add_error(error.clone());
                        observer.batch_error(&outcome.paths, &error);
                    }
                },
                Err(join_err) => {
                    stats.add_error(format!("batch task panicked: {join_err}"));
                }
            }
        }

        // Reconcile deletions: cached paths the walk no longer saw.
        let deleted: Vec<String> = previous
            .keys()
            .filter(|path| !visited.contains(*path))
            .cloned()
            .collect();
        if !deleted.is_empty() {
            log::info!("Reconciling {} deleted files", deleted.len());
            self.store.delete_points_by_file_paths(&deleted).await?;
            for path in &deleted {
                self.cache.delete(path);
            }
        }

        self.cache.flush().await?;

        stats.time_ms = started.elapsed().as_millis().max(1) as u64;
        log::info!(
            "Scan finished: {} processed, {} skipped, {} blocks, {} errors in {}ms",
            stats.processed_files,
            stats.skipped_files,
            stats.indexed_blocks,
            stats.errors.len(),
            stats.time_ms
        );
        Ok(stats)
    }

    fn spawn_parse_workers(
        &self,
        files: &[PathBuf],
        previous: &HashMap<String, String>,
        outcome_tx: mpsc::Sender<ParseOutcome>,
    ) {
        let parse_sem = Arc::new(Semaphore::new(PARSING_CONCURRENCY));
        for file in files {
            let file = file.clone();
            let root = self.root.clone();
            let chunker = self.chunker.clone();
            let cached_hash = previous.get(&normalize_path(&self.root, &file)).cloned();
            let tx = outcome_tx.clone();
            let sem = parse_sem.clone();
            tokio::spawn(async move {
                let permit = sem.acquire_owned().await;
                if permit.is_err() {
                    return;
                }
                let outcome = parse_one(&root, &file, &chunker, cached_hash).await;
                let _ = tx.send(outcome).await;
            });
        }
    }

    fn spawn_batch(&self, batch: Batch, sem: Arc<Semaphore>) -> JoinHandle<BatchOutcome> {
        let root = self.root.clone();
        let embedder = self.embedder.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            let _permit = sem.acquire_owned().await;
            let paths: Vec<String> = batch.file_hashes.keys().cloned().collect();
            let blocks = batch.blocks.len();
            let result = index_batch_with_retry(&root, &embedder, &store, &batch).await;
            BatchOutcome {
                paths,
                blocks,
                result: result.map(|()| batch.file_hashes),
            }
        })
    }
}

/// Delete-stale → embed → upsert, retried as a unit with exponential
/// backoff on retryable service errors. Hashes are committed by the
/// caller only when this returns `Ok`.
async fn index_batch_with_retry(
    root: &Path,
    embedder: &Arc<dyn Embedder>,
    store: &Arc<dyn VectorStore>,
    batch: &Batch,
) -> std::result::Result<(), String> {
    let mut attempt = 1usize;
    loop {
        match index_batch(root, embedder, store, batch).await {
            Ok(()) => return Ok(()),
            Err(err) if err.is_retryable() && attempt < MAX_BATCH_RETRIES => {
                let delay = INITIAL_RETRY_DELAY_MS * (1 << (attempt - 1)) as u64;
                log::warn!(
                    "Batch attempt {attempt}/{MAX_BATCH_RETRIES} failed ({err}); retrying in {delay}ms"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(err) => {
                return Err(format!(
                    "batch of {} blocks failed after {attempt} attempt(s): {err}",
                    batch.blocks.len()
                ));
            }
        }
    }
}

async fn index_batch(
    root: &Path,
    embedder: &Arc<dyn Embedder>,
    store: &Arc<dyn VectorStore>,
    batch: &Batch,
) -> atlas_vector_store::Result<()> {
    if !batch.delete_paths.is_empty() {
        store.delete_points_by_file_paths(&batch.delete_paths).await?;
    }

    let records = embed_blocks(root, embedder, &batch.blocks).await?;
    store.upsert_points(&records).await
}

/// Embed `blocks` in token-budgeted sub-batches and pair each vector with
/// its deterministic record id. Shared by the scanner and the watcher.
pub(crate) async fn embed_blocks(
    root: &Path,
    embedder: &Arc<dyn Embedder>,
    blocks: &[CodeBlock],
) -> atlas_vector_store::Result<Vec<VectorRecord>> {
    let texts: Vec<String> = blocks.iter().map(|b| b.content.clone()).collect();
    let mut records = Vec::with_capacity(blocks.len());
    for group in pack_by_token_budget(&texts) {
        let group_texts: Vec<String> = group.iter().map(|&i| texts[i].clone()).collect();
        let response = embedder.create_embeddings(&group_texts).await?;
        for (&block_index, vector) in group.iter().zip(response.embeddings) {
            let block = &blocks[block_index];
            records.push(VectorRecord {
                id: point_id(root, &block.file_path, block.start_line),
                vector,
                payload: RecordPayload {
                    file_path: block.file_path.clone(),
                    content: block.content.clone(),
                    start_line: block.start_line,
                    end_line: block.end_line,
                },
            });
        }
    }
    Ok(records)
}

async fn parse_one(
    root: &Path,
    path: &Path,
    chunker: &Chunker,
    cached_hash: Option<String>,
) -> ParseOutcome {
    let rel_path = normalize_path(root, path);

    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(err) => {
            return ParseOutcome::Failed {
                rel_path,
                error: err.to_string(),
            }
        }
    };
    if metadata.len() > MAX_FILE_SIZE_BYTES {
        return ParseOutcome::TooLarge { rel_path };
    }

    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) => {
            return ParseOutcome::Failed {
                rel_path,
                error: err.to_string(),
            }
        }
    };

    let file_hash = hash_file_content(&content);
    if cached_hash.as_deref() == Some(file_hash.as_str()) {
        return ParseOutcome::Unchanged;
    }

    match chunker.parse(&rel_path, &content, &file_hash) {
        Ok(blocks) => ParseOutcome::Parsed {
            rel_path,
            file_hash,
            previously_indexed: cached_hash.is_some(),
            blocks,
        },
        Err(err) => ParseOutcome::Failed {
            rel_path,
            error: err.to_string(),
        },
    }
}

/// Workspace-relative path with forward slashes.
pub(crate) fn normalize_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut normalized = relative.to_string_lossy().to_string();
    if normalized.contains('\\') {
        normalized = normalized.replace('\\', "/");
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_root_and_backslashes() {
        let root = PathBuf::from("/ws");
        assert_eq!(
            normalize_path(&root, &PathBuf::from("/ws/src/lib.rs")),
            "src/lib.rs"
        );
        assert_eq!(
            normalize_path(&root, &PathBuf::from("/elsewhere/x.rs")),
            "/elsewhere/x.rs"
        );
    }
}
