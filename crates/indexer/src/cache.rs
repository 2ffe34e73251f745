use crate::error::Result;
use crate::CACHE_DEBOUNCE_MS;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Persisted `file path → content hash` map backing change detection.
///
/// `update`/`delete` return immediately; the durable write happens on a
/// debounced flush task with cancel/reschedule semantics. Losing the last
/// debounce window on crash only causes redundant re-indexing of a few
/// files on the next scan, never corruption.
pub struct HashCache {
    path: PathBuf,
    entries: Arc<Mutex<HashMap<String, String>>>,
    pending_flush: Mutex<Option<JoinHandle<()>>>,
    debounce: Duration,
}

impl HashCache {
    /// Cache file location for one workspace: namespaced by a hash of the
    /// workspace path so projects sharing a storage root never collide.
    pub fn cache_file_path(storage_root: &Path, workspace_root: &Path) -> PathBuf {
        let normalized = workspace_root.to_string_lossy().replace('\\', "/");
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(16);
        for byte in digest.iter().take(8) {
            hex.push_str(&format!("{byte:02x}"));
        }
        storage_root.join(format!("cache-{hex}.json"))
    }

    /// Load the cache file, or start empty when it is missing/corrupt.
    pub async fn load(path: PathBuf) -> Arc<Self> {
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(json) => match serde_json::from_str::<HashMap<String, String>>(&json) {
                Ok(entries) => entries,
                Err(err) => {
                    log::warn!(
                        "Corrupt hash cache {}: {err}; starting empty",
                        path.display()
                    );
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Arc::new(Self {
            path,
            entries: Arc::new(Mutex::new(entries)),
            pending_flush: Mutex::new(None),
            debounce: Duration::from_millis(CACHE_DEBOUNCE_MS),
        })
    }

    #[must_use]
    pub fn get(&self, file_path: &str) -> Option<String> {
        self.entries.lock().unwrap().get(file_path).cloned()
    }

    /// Whole-map copy for bulk scan use.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries.lock().unwrap().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    pub fn update(&self, file_path: impl Into<String>, hash: impl Into<String>) {
        self.entries
            .lock()
            .unwrap()
            .insert(file_path.into(), hash.into());
        self.schedule_flush();
    }

    pub fn delete(&self, file_path: &str) {
        self.entries.lock().unwrap().remove(file_path);
        self.schedule_flush();
    }

    /// Drop every entry and persist immediately.
    pub async fn clear(&self) -> Result<()> {
        self.cancel_pending();
        self.entries.lock().unwrap().clear();
        self.save_now().await
    }

    /// Cancel any pending debounced write and persist now. Call on
    /// shutdown and after a scan's reconciliation pass.
    pub async fn flush(&self) -> Result<()> {
        self.cancel_pending();
        self.save_now().await
    }

    fn schedule_flush(&self) {
        let mut pending = self.pending_flush.lock().unwrap();
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        let entries = self.entries.clone();
        let path = self.path.clone();
        let debounce = self.debounce;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Err(err) = persist(&path, &entries).await {
                log::warn!("Hash cache flush failed: {err}");
            }
        }));
    }

    fn cancel_pending(&self) {
        if let Some(handle) = self.pending_flush.lock().unwrap().take() {
            handle.abort();
        }
    }

    async fn save_now(&self) -> Result<()> {
        persist(&self.path, &self.entries).await
    }
}

async fn persist(path: &Path, entries: &Arc<Mutex<HashMap<String, String>>>) -> Result<()> {
    let json = {
        let entries = entries.lock().unwrap();
        serde_json::to_string_pretty(&*entries)?
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, json).await?;
    Ok(())
}

impl Drop for HashCache {
    fn drop(&mut self) {
        if let Some(handle) = self.pending_flush.lock().unwrap().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn cache_paths_are_namespaced_per_workspace() {
        let storage = PathBuf::from("/data/atlas");
        let a = HashCache::cache_file_path(&storage, &PathBuf::from("/home/dev/a"));
        let b = HashCache::cache_file_path(&storage, &PathBuf::from("/home/dev/b"));
        assert_ne!(a, b);
        assert!(a.starts_with(&storage));
    }

    #[tokio::test]
    async fn flush_persists_and_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");

        let cache = HashCache::load(path.clone()).await;
        cache.update("src/lib.rs", "abc123");
        cache.update("src/main.rs", "def456");
        cache.delete("src/main.rs");
        cache.flush().await.unwrap();

        let reloaded = HashCache::load(path).await;
        assert_eq!(reloaded.get("src/lib.rs").as_deref(), Some("abc123"));
        assert_eq!(reloaded.get("src/main.rs"), None);
        assert_eq!(reloaded.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn updates_coalesce_into_one_debounced_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");

        let cache = HashCache::load(path.clone()).await;
        cache.update("a.rs", "1");
        cache.update("b.rs", "2");
        cache.update("c.rs", "3");
        // nothing durable until the debounce window passes
        assert!(tokio::fs::read_to_string(&path).await.is_err());

        tokio::time::sleep(Duration::from_millis(CACHE_DEBOUNCE_MS + 50)).await;

        let mut json = None;
        for _ in 0..100 {
            tokio::task::yield_now().await;
            if let Ok(contents) = tokio::fs::read_to_string(&path).await {
                json = Some(contents);
                break;
            }
        }
        let parsed: HashMap<String, String> =
            serde_json::from_str(&json.expect("debounced write landed")).unwrap();
        assert_eq!(parsed.len(), 3);
    }

    #[tokio::test]
    async fn clear_empties_and_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");

        let cache = HashCache::load(path.clone()).await;
        cache.update("a.rs", "1");
        cache.clear().await.unwrap();
        assert!(cache.is_empty());

        let reloaded = HashCache::load(path).await;
        assert!(reloaded.is_empty());
    }

    #[tokio::test]
    async fn corrupt_cache_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let cache = HashCache::load(path).await;
        assert!(cache.is_empty());
    }
}
