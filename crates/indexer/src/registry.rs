use crate::orchestrator::IndexOrchestrator;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Host-owned map of workspace path → engine instance.
///
/// The engine itself holds no global state; one registry per host process
/// makes engine lifetimes explicit and testable.
#[derive(Default)]
pub struct WorkspaceRegistry {
    engines: Mutex<HashMap<PathBuf, Arc<IndexOrchestrator>>>,
}

impl WorkspaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, engine: Arc<IndexOrchestrator>) {
        let mut engines = self.engines.lock().await;
        engines.insert(engine.root().to_path_buf(), engine);
    }

    pub async fn get(&self, root: &Path) -> Option<Arc<IndexOrchestrator>> {
        self.engines.lock().await.get(root).cloned()
    }

    /// Remove and dispose the engine for `root`, if any.
    pub async fn remove(&self, root: &Path) -> Option<Arc<IndexOrchestrator>> {
        let engine = self.engines.lock().await.remove(root);
        if let Some(engine) = &engine {
            engine.dispose().await;
        }
        engine
    }

    pub async fn roots(&self) -> Vec<PathBuf> {
        self.engines.lock().await.keys().cloned().collect()
    }

    pub async fn dispose_all(&self) {
        let engines: Vec<Arc<IndexOrchestrator>> =
            self.engines.lock().await.drain().map(|(_, e)| e).collect();
        for engine in engines {
            engine.dispose().await;
        }
    }
}
