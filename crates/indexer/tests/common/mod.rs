//! Shared fakes for pipeline tests: a counting embedder with a scripted
//! failure queue, and a delegating store that counts calls.

use async_trait::async_trait;
use atlas_vector_store::{
    Embedder, EmbeddingResponse, EmbeddingUsage, InMemoryVectorStore, Result, SearchHit,
    VectorRecord, VectorStore, VectorStoreError,
};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Failure the fake embedder should produce before succeeding.
pub enum ScriptedFailure {
    Retryable,
    Fatal,
}

pub struct FakeEmbedder {
    pub calls: AtomicUsize,
    script: Mutex<VecDeque<ScriptedFailure>>,
}

impl FakeEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(VecDeque::new()),
        })
    }

    pub fn with_failures(failures: Vec<ScriptedFailure>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(failures.into()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Deterministic unit vector derived from the text bytes.
    fn vector_for(text: &str) -> Vec<f32> {
        let mut acc = [1.0f32; 4];
        for (i, byte) in text.bytes().enumerate() {
            acc[i % 4] += f32::from(byte) / 255.0;
        }
        let norm = acc.iter().map(|x| x * x).sum::<f32>().sqrt();
        acc.iter().map(|x| x / norm).collect()
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn create_embeddings(&self, texts: &[String]) -> Result<EmbeddingResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(failure) = self.script.lock().unwrap().pop_front() {
            return Err(match failure {
                ScriptedFailure::Retryable => {
                    VectorStoreError::RateLimited("scripted rate limit".into())
                }
                ScriptedFailure::Fatal => VectorStoreError::Api {
                    status: 400,
                    body: "scripted fatal error".into(),
                },
            });
        }

        Ok(EmbeddingResponse {
            embeddings: texts.iter().map(|t| Self::vector_for(t)).collect(),
            usage: EmbeddingUsage::default(),
        })
    }

    fn dimensions(&self) -> usize {
        4
    }
}

/// In-memory store that counts mutating calls.
pub struct CountingStore {
    pub inner: InMemoryVectorStore,
    pub upsert_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryVectorStore::new(),
            upsert_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
        })
    }

    pub fn upsert_count(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStore for CountingStore {
    async fn initialize(&self) -> Result<bool> {
        self.inner.initialize().await
    }

    async fn upsert_points(&self, records: &[VectorRecord]) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert_points(records).await
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        self.inner.search(vector, limit).await
    }

    async fn delete_points_by_file_path(&self, file_path: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_points_by_file_path(file_path).await
    }

    async fn delete_points_by_file_paths(&self, file_paths: &[String]) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_points_by_file_paths(file_paths).await
    }

    async fn clear_collection(&self) -> Result<()> {
        self.inner.clear_collection().await
    }

    async fn delete_collection(&self) -> Result<()> {
        self.inner.delete_collection().await
    }

    async fn collection_exists(&self) -> Result<bool> {
        self.inner.collection_exists().await
    }
}

/// Write a Rust source file with `functions` sizable functions so the
/// chunker reliably emits one block per function.
pub fn write_rust_file(dir: &Path, name: &str, functions: usize) {
    let mut source = String::new();
    for i in 0..functions {
        source.push_str(&format!(
            "fn generated_function_{i}(input: u64) -> u64 {{\n    let doubled = input * 2;\n    let shifted = doubled + {i};\n    shifted * shifted\n}}\n\n"
        ));
    }
    std::fs::write(dir.join(name), source).unwrap();
}
