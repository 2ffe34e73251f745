mod common;

use async_trait::async_trait;
use atlas_indexer::{IndexOrchestrator, IndexStatus, IndexerError, WorkspaceRegistry};
use atlas_vector_store::{Result as StoreResult, SearchHit, VectorRecord, VectorStore, VectorStoreError};
use common::{write_rust_file, CountingStore, FakeEmbedder};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

async fn orchestrator(
    workspace: &TempDir,
    storage: &TempDir,
    store: Arc<CountingStore>,
) -> IndexOrchestrator {
    IndexOrchestrator::new(
        workspace.path(),
        storage.path(),
        FakeEmbedder::new(),
        store,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn full_lifecycle_reaches_indexed() {
    let workspace = TempDir::new().unwrap();
    let storage = TempDir::new().unwrap();
    write_rust_file(workspace.path(), "a.rs", 3);
    write_rust_file(workspace.path(), "b.rs", 2);

    let store = CountingStore::new();
    let engine = orchestrator(&workspace, &storage, store.clone()).await;
    let mut progress = engine.state().subscribe();

    let stats = engine.start_indexing().await.unwrap();
    assert_eq!(stats.processed_files, 2);
    assert_eq!(stats.indexed_blocks, 5);
    assert_eq!(engine.state().status(), IndexStatus::Indexed);
    assert_eq!(store.inner.len(), 5);

    // the progress stream observed the transition
    progress.changed().await.ok();
    let snapshot = progress.borrow().clone();
    assert_eq!(snapshot.status, IndexStatus::Indexed);
    assert_eq!(snapshot.processed_blocks, 5);

    engine.dispose().await;
}

#[tokio::test]
async fn concurrent_start_is_rejected_not_queued() {
    let workspace = TempDir::new().unwrap();
    let storage = TempDir::new().unwrap();
    for i in 0..6 {
        write_rust_file(workspace.path(), &format!("file_{i}.rs"), 4);
    }

    let store = CountingStore::new();
    let engine = Arc::new(orchestrator(&workspace, &storage, store).await);

    let background = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.start_indexing().await })
    };

    // wait until the scan actually owns the indexing guard
    let mut rejected = None;
    for _ in 0..1000 {
        tokio::task::yield_now().await;
        match engine.start_indexing().await {
            Err(IndexerError::AlreadyIndexing) => {
                rejected = Some(());
                break;
            }
            Ok(_) => break,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    let first = background.await.unwrap();
    assert!(first.is_ok() || rejected.is_some());
    engine.dispose().await;
}

#[tokio::test]
async fn clear_index_data_returns_to_standby() {
    let workspace = TempDir::new().unwrap();
    let storage = TempDir::new().unwrap();
    write_rust_file(workspace.path(), "a.rs", 2);

    let store = CountingStore::new();
    let engine = orchestrator(&workspace, &storage, store.clone()).await;
    engine.start_indexing().await.unwrap();
    assert!(!store.inner.is_empty());
    assert!(!engine.cache().is_empty());

    engine.clear_index_data().await.unwrap();
    assert_eq!(engine.state().status(), IndexStatus::Standby);
    assert!(store.inner.is_empty());
    assert!(engine.cache().is_empty());

    // the engine stays usable: a fresh start re-indexes everything
    let stats = engine.start_indexing().await.unwrap();
    assert_eq!(stats.processed_files, 1);
    engine.dispose().await;
}

#[tokio::test]
async fn fresh_collection_resets_stale_cache() {
    let workspace = TempDir::new().unwrap();
    let storage = TempDir::new().unwrap();
    write_rust_file(workspace.path(), "a.rs", 2);

    // first engine indexes and persists cache entries
    let engine = orchestrator(&workspace, &storage, CountingStore::new()).await;
    engine.start_indexing().await.unwrap();
    engine.dispose().await;

    // second engine reuses the cache file but talks to an empty store;
    // bootstrap reports created-new, so cached hashes must be dropped
    // and the tree re-indexed
    let store = CountingStore::new();
    let engine = orchestrator(&workspace, &storage, store.clone()).await;
    let stats = engine.start_indexing().await.unwrap();
    assert_eq!(stats.processed_files, 1);
    assert_eq!(stats.skipped_files, 0);
    assert!(!store.inner.is_empty());
    engine.dispose().await;
}

struct UnreachableStore;

#[async_trait]
impl VectorStore for UnreachableStore {
    async fn initialize(&self) -> StoreResult<bool> {
        Err(VectorStoreError::Api {
            status: 503,
            body: "connection refused".into(),
        })
    }

    async fn upsert_points(&self, _records: &[VectorRecord]) -> StoreResult<()> {
        Err(VectorStoreError::Api {
            status: 503,
            body: "connection refused".into(),
        })
    }

    async fn search(&self, _vector: &[f32], _limit: usize) -> StoreResult<Vec<SearchHit>> {
        Err(VectorStoreError::Api {
            status: 503,
            body: "connection refused".into(),
        })
    }

    async fn delete_points_by_file_path(&self, _file_path: &str) -> StoreResult<()> {
        Ok(())
    }

    async fn delete_points_by_file_paths(&self, _file_paths: &[String]) -> StoreResult<()> {
        Ok(())
    }

    async fn clear_collection(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn delete_collection(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn collection_exists(&self) -> StoreResult<bool> {
        Ok(false)
    }
}

#[tokio::test]
async fn unreachable_store_surfaces_error_state() {
    let workspace = TempDir::new().unwrap();
    let storage = TempDir::new().unwrap();
    write_rust_file(workspace.path(), "a.rs", 2);

    let engine = IndexOrchestrator::new(
        workspace.path(),
        storage.path(),
        FakeEmbedder::new(),
        Arc::new(UnreachableStore),
    )
    .await
    .unwrap();

    assert!(engine.start_indexing().await.is_err());
    assert_eq!(engine.state().status(), IndexStatus::Error);
    // still callable; the guard was released
    assert!(matches!(
        engine.start_indexing().await,
        Err(IndexerError::VectorStore(_))
    ));
}

#[tokio::test]
async fn config_change_requiring_clear_rebuilds_the_index() {
    let workspace = TempDir::new().unwrap();
    let storage = TempDir::new().unwrap();
    write_rust_file(workspace.path(), "a.rs", 2);

    let store = CountingStore::new();
    let engine = orchestrator(&workspace, &storage, store.clone()).await;
    engine.start_indexing().await.unwrap();
    let before = store.inner.len();
    assert!(before > 0);

    let delta = atlas_indexer::ConfigDelta {
        requires_restart: true,
        requires_clear: true,
    };
    engine.apply_configuration(delta).await.unwrap();

    assert_eq!(engine.state().status(), IndexStatus::Indexed);
    assert_eq!(store.inner.len(), before);
    engine.dispose().await;
}

#[tokio::test]
async fn registry_maps_workspaces_to_engines() {
    let workspace = TempDir::new().unwrap();
    let storage = TempDir::new().unwrap();
    write_rust_file(workspace.path(), "a.rs", 2);

    let registry = WorkspaceRegistry::new();
    let engine = Arc::new(orchestrator(&workspace, &storage, CountingStore::new()).await);
    registry.insert(engine.clone()).await;

    let found = registry.get(workspace.path()).await.unwrap();
    assert_eq!(found.root(), workspace.path());
    assert_eq!(registry.roots().await.len(), 1);

    registry.remove(workspace.path()).await;
    assert!(registry.get(workspace.path()).await.is_none());
}
