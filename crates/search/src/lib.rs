//! # Atlas Search
//!
//! Similarity queries over an indexed workspace: embed the query text as a
//! single-item batch, delegate to the vector store's top-`limit` search,
//! and return hits in the store's native descending-similarity order.
//!
//! Search is gated on the index state: `Indexed` and `Indexing` are
//! queryable (partial results beat no results mid-scan); `Standby` and
//! `Error` reject with a descriptive error instead of silently returning
//! nothing.

use atlas_indexer::{IndexState, IndexStatus};
use atlas_vector_store::{Embedder, SearchHit, VectorStore, VectorStoreError};
use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("index is not queryable (status: {0:?}): run indexing first")]
    NotReady(IndexStatus),

    #[error("query must not be empty")]
    EmptyQuery,

    #[error("embedding provider returned no vector for the query")]
    NoQueryVector,

    #[error("search backend error: {0}")]
    Backend(#[from] VectorStoreError),
}

/// Query service for one workspace's index.
pub struct SearchService {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    state: Arc<IndexState>,
}

impl SearchService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        state: Arc<IndexState>,
    ) -> Self {
        Self {
            embedder,
            store,
            state,
        }
    }

    /// Top-`limit` blocks most similar to `query`.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let status = self.state.status();
        if !status.is_queryable() {
            return Err(SearchError::NotReady(status));
        }
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let response = self
            .embedder
            .create_embeddings(std::slice::from_ref(&query.to_string()))
            .await?;
        let vector = response
            .embeddings
            .into_iter()
            .next()
            .ok_or(SearchError::NoQueryVector)?;

        log::debug!("Searching index (limit {limit})");
        Ok(self.store.search(&vector, limit).await?)
    }
}
