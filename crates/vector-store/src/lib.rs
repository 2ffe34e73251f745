//! # Atlas Vector Store
//!
//! Service adapters for the indexing pipeline's two external capabilities:
//! embedding providers (text → vector) and vector databases (persist/query
//! vectors by id and by file-path payload).
//!
//! Both capabilities are `async_trait` seams with a small closed set of
//! implementations chosen from configuration at construction time:
//!
//! - [`Embedder`]: [`OpenAiCompatEmbedder`], [`OllamaEmbedder`]
//! - [`VectorStore`]: [`QdrantVectorStore`], [`InMemoryVectorStore`]

mod embedder;
mod error;
mod memory;
mod ollama;
mod openai;
mod qdrant;
mod record;
mod store;

pub use embedder::{Embedder, EmbeddingResponse, EmbeddingUsage};
pub use error::{Result, VectorStoreError};
pub use memory::InMemoryVectorStore;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAiCompatEmbedder;
pub use qdrant::QdrantVectorStore;
pub use record::{collection_name_for_workspace, point_id, RecordPayload, SearchHit, VectorRecord};
pub use store::VectorStore;
