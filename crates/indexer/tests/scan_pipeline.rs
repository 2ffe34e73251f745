mod common;

use atlas_code_chunker::{Chunker, ChunkerConfig};
use atlas_indexer::{BatchErrorFn, DirectoryScanner, HashCache, ScanObserver, MAX_BATCH_RETRIES};
use common::{write_rust_file, CountingStore, FakeEmbedder, ScriptedFailure};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    workspace: TempDir,
    _storage: TempDir,
    embedder: Arc<FakeEmbedder>,
    store: Arc<CountingStore>,
    cache: Arc<HashCache>,
}

impl Harness {
    async fn new(embedder: Arc<FakeEmbedder>) -> Self {
        let workspace = TempDir::new().unwrap();
        let storage = TempDir::new().unwrap();
        let cache_path = HashCache::cache_file_path(storage.path(), workspace.path());
        let cache = HashCache::load(cache_path).await;
        Self {
            workspace,
            _storage: storage,
            embedder,
            store: CountingStore::new(),
            cache,
        }
    }

    fn scanner(&self) -> DirectoryScanner {
        DirectoryScanner::new(
            self.workspace.path(),
            Arc::new(Chunker::new(ChunkerConfig::for_embeddings())),
            self.embedder.clone(),
            self.store.clone(),
            self.cache.clone(),
        )
    }
}

#[tokio::test]
async fn rescan_of_unchanged_tree_is_free() {
    let harness = Harness::new(FakeEmbedder::new()).await;
    write_rust_file(harness.workspace.path(), "a.rs", 3);
    write_rust_file(harness.workspace.path(), "b.rs", 2);
    write_rust_file(harness.workspace.path(), "c.rs", 4);

    let first = harness.scanner().scan(&ScanObserver::default()).await.unwrap();
    assert_eq!(first.processed_files, 3);
    assert_eq!(first.skipped_files, 0);
    assert!(first.indexed_blocks > 0);

    let embed_calls = harness.embedder.call_count();
    let upserts = harness.store.upsert_count();
    let ids = harness.store.inner.point_ids();
    assert!(embed_calls > 0);

    let second = harness.scanner().scan(&ScanObserver::default()).await.unwrap();
    assert_eq!(second.processed_files, 0);
    assert_eq!(second.skipped_files, 3);
    assert_eq!(second.indexed_blocks, 0);
    // cache hits mean zero embedding calls and zero upserts
    assert_eq!(harness.embedder.call_count(), embed_calls);
    assert_eq!(harness.store.upsert_count(), upserts);
    assert_eq!(harness.store.inner.point_ids(), ids);
}

#[tokio::test]
async fn changing_one_file_touches_only_its_records() {
    let harness = Harness::new(FakeEmbedder::new()).await;
    write_rust_file(harness.workspace.path(), "stable.rs", 3);
    write_rust_file(harness.workspace.path(), "volatile.rs", 2);

    harness.scanner().scan(&ScanObserver::default()).await.unwrap();
    let stable_before = harness.store.inner.point_ids_for_file("stable.rs");
    let volatile_before = harness.store.inner.point_ids_for_file("volatile.rs");
    assert!(!stable_before.is_empty());

    write_rust_file(harness.workspace.path(), "volatile.rs", 5);
    let stats = harness.scanner().scan(&ScanObserver::default()).await.unwrap();
    assert_eq!(stats.processed_files, 1);
    assert_eq!(stats.skipped_files, 1);

    assert_eq!(
        harness.store.inner.point_ids_for_file("stable.rs"),
        stable_before
    );
    let volatile_after = harness.store.inner.point_ids_for_file("volatile.rs");
    assert_ne!(volatile_after, volatile_before);
    assert_eq!(volatile_after.len(), 5);
}

#[tokio::test]
async fn deleting_a_file_removes_exactly_its_records() {
    let harness = Harness::new(FakeEmbedder::new()).await;
    write_rust_file(harness.workspace.path(), "kept.rs", 3);
    write_rust_file(harness.workspace.path(), "doomed.rs", 2);

    harness.scanner().scan(&ScanObserver::default()).await.unwrap();
    let kept_before = harness.store.inner.point_ids_for_file("kept.rs");
    assert!(harness.cache.get("doomed.rs").is_some());

    std::fs::remove_file(harness.workspace.path().join("doomed.rs")).unwrap();
    harness.scanner().scan(&ScanObserver::default()).await.unwrap();

    assert!(harness.store.inner.point_ids_for_file("doomed.rs").is_empty());
    assert_eq!(harness.cache.get("doomed.rs"), None);
    assert_eq!(harness.store.inner.point_ids_for_file("kept.rs"), kept_before);
    assert!(harness.cache.get("kept.rs").is_some());
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_report_once_and_commit_nothing() {
    let embedder = FakeEmbedder::with_failures(vec![
        ScriptedFailure::Retryable,
        ScriptedFailure::Retryable,
        ScriptedFailure::Retryable,
    ]);
    let harness = Harness::new(embedder).await;
    write_rust_file(harness.workspace.path(), "a.rs", 2);

    let error_count = Arc::new(AtomicUsize::new(0));
    let on_batch_error: BatchErrorFn = {
        let error_count = error_count.clone();
        Arc::new(move |_paths: &[String], _err: &str| {
            error_count.fetch_add(1, Ordering::SeqCst);
        })
    };
    let observer = ScanObserver {
        on_batch_error: Some(on_batch_error),
        ..Default::default()
    };

    let stats = harness.scanner().scan(&observer).await.unwrap();

    assert_eq!(harness.embedder.call_count(), MAX_BATCH_RETRIES);
    assert_eq!(error_count.load(Ordering::SeqCst), 1);
    assert_eq!(stats.errors.len(), 1);
    assert_eq!(stats.indexed_blocks, 0);
    // nothing committed: the file is reconsidered on the next scan
    assert_eq!(harness.cache.get("a.rs"), None);
    assert!(harness.store.inner.is_empty());

    let rescan = harness.scanner().scan(&ScanObserver::default()).await.unwrap();
    assert_eq!(rescan.processed_files, 1);
    assert!(harness.cache.get("a.rs").is_some());
}

#[tokio::test(start_paused = true)]
async fn batch_succeeding_on_second_attempt_commits_all_hashes() {
    let embedder = FakeEmbedder::with_failures(vec![ScriptedFailure::Retryable]);
    let harness = Harness::new(embedder).await;
    write_rust_file(harness.workspace.path(), "a.rs", 2);
    write_rust_file(harness.workspace.path(), "b.rs", 2);

    let error_count = Arc::new(AtomicUsize::new(0));
    let on_batch_error: BatchErrorFn = {
        let error_count = error_count.clone();
        Arc::new(move |_paths: &[String], _err: &str| {
            error_count.fetch_add(1, Ordering::SeqCst);
        })
    };
    let observer = ScanObserver {
        on_batch_error: Some(on_batch_error),
        ..Default::default()
    };

    let stats = harness.scanner().scan(&observer).await.unwrap();

    assert_eq!(error_count.load(Ordering::SeqCst), 0);
    assert_eq!(stats.indexed_blocks, 4);
    assert!(harness.cache.get("a.rs").is_some());
    assert!(harness.cache.get("b.rs").is_some());
    assert_eq!(harness.store.inner.len(), 4);
}

#[tokio::test]
async fn fatal_batch_error_is_not_retried() {
    let embedder = FakeEmbedder::with_failures(vec![ScriptedFailure::Fatal]);
    let harness = Harness::new(embedder).await;
    write_rust_file(harness.workspace.path(), "a.rs", 2);

    let stats = harness.scanner().scan(&ScanObserver::default()).await.unwrap();

    assert_eq!(harness.embedder.call_count(), 1);
    assert_eq!(stats.errors.len(), 1);
    assert_eq!(harness.cache.get("a.rs"), None);
}

#[tokio::test]
async fn scenario_small_file_yields_no_cache_entry() {
    let harness = Harness::new(FakeEmbedder::new()).await;
    // A: plenty of functions, B: too small to chunk, C: large
    write_rust_file(harness.workspace.path(), "a.rs", 5);
    std::fs::write(harness.workspace.path().join("b.rs"), "// tiny\n").unwrap();
    write_rust_file(harness.workspace.path(), "c.rs", 20);

    let stats = harness.scanner().scan(&ScanObserver::default()).await.unwrap();
    assert_eq!(stats.processed_files, 3);

    assert!(harness.cache.get("a.rs").is_some());
    assert_eq!(harness.cache.get("b.rs"), None);
    assert!(harness.cache.get("c.rs").is_some());
    assert!(harness.store.inner.point_ids_for_file("b.rs").is_empty());

    let a_ids = harness.store.inner.point_ids_for_file("a.rs");
    std::fs::remove_file(harness.workspace.path().join("c.rs")).unwrap();
    harness.scanner().scan(&ScanObserver::default()).await.unwrap();

    assert!(harness.store.inner.point_ids_for_file("c.rs").is_empty());
    assert_eq!(harness.cache.get("c.rs"), None);
    assert_eq!(harness.store.inner.point_ids_for_file("a.rs"), a_ids);
}

#[tokio::test]
async fn gitignored_files_are_not_indexed() {
    let harness = Harness::new(FakeEmbedder::new()).await;
    write_rust_file(harness.workspace.path(), "visible.rs", 2);
    std::fs::create_dir_all(harness.workspace.path().join("generated")).unwrap();
    write_rust_file(&harness.workspace.path().join("generated"), "hidden.rs", 2);
    std::fs::write(harness.workspace.path().join(".gitignore"), "generated/\n").unwrap();

    let stats = harness.scanner().scan(&ScanObserver::default()).await.unwrap();
    assert_eq!(stats.processed_files, 1);
    assert!(harness
        .store
        .inner
        .point_ids_for_file("generated/hidden.rs")
        .is_empty());
}
