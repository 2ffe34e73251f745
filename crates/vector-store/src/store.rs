use crate::error::Result;
use crate::record::{SearchHit, VectorRecord};
use async_trait::async_trait;

/// Persist/query/delete vectors by id and by file-path payload.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Ensure the backing collection exists. Returns `true` when it was
    /// newly created; callers must then drop any "already indexed"
    /// assumptions (a fresh collection holds no vectors).
    async fn initialize(&self) -> Result<bool>;

    /// Insert-or-replace records by id.
    async fn upsert_points(&self, records: &[VectorRecord]) -> Result<()>;

    /// Top-`limit` similarity search, descending score.
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>>;

    async fn delete_points_by_file_path(&self, file_path: &str) -> Result<()>;

    async fn delete_points_by_file_paths(&self, file_paths: &[String]) -> Result<()>;

    /// Remove every point but keep the collection.
    async fn clear_collection(&self) -> Result<()>;

    /// Drop the collection itself.
    async fn delete_collection(&self) -> Result<()>;

    async fn collection_exists(&self) -> Result<bool>;
}
