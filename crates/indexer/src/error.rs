use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Chunker error: {0}")]
    Chunker(#[from] atlas_code_chunker::ChunkerError),

    #[error("Vector store error: {0}")]
    VectorStore(#[from] atlas_vector_store::VectorStoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid workspace path: {0}")]
    InvalidPath(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Indexing already in progress")]
    AlreadyIndexing,

    #[error("{0}")]
    Other(String),
}
