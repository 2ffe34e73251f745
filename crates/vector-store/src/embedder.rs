use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Token accounting reported by the provider, when available.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbeddingUsage {
    pub prompt_tokens: u64,
    pub total_tokens: u64,
}

/// Result of one embedding call: one vector per input text, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResponse {
    pub embeddings: Vec<Vec<f32>>,
    pub usage: EmbeddingUsage,
}

/// Text → vector capability.
///
/// Implementations classify failures via [`crate::VectorStoreError::is_retryable`]
/// but do not retry internally; the scanner's batch unit owns the retry
/// policy so a batch retries delete/embed/upsert as a whole.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn create_embeddings(&self, texts: &[String]) -> Result<EmbeddingResponse>;

    /// Vector width, used to bootstrap the store's collection.
    fn dimensions(&self) -> usize;
}
