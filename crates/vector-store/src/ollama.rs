//! Ollama embedding client (`/api/embed`).

use crate::embedder::{Embedder, EmbeddingResponse, EmbeddingUsage};
use crate::error::{Result, VectorStoreError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Embeddings client for a local or remote Ollama daemon.
#[derive(Clone)]
pub struct OllamaEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: impl Into<String>, dimensions: usize) -> Result<Self> {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(VectorStoreError::Config(format!(
                "Ollama base URL must be http(s): {base_url}"
            )));
        }
        let model = model.into();
        if model.trim().is_empty() {
            return Err(VectorStoreError::Config("missing Ollama model".into()));
        }
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/embed", base_url.trim_end_matches('/')),
            model,
            dimensions,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn create_embeddings(&self, texts: &[String]) -> Result<EmbeddingResponse> {
        if texts.is_empty() {
            return Ok(EmbeddingResponse {
                embeddings: Vec::new(),
                usage: EmbeddingUsage::default(),
            });
        }

        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(VectorStoreError::from_status(status, body));
        }

        let parsed: EmbedResponse = response.json().await?;
        if parsed.embeddings.len() != texts.len() {
            return Err(VectorStoreError::CountMismatch {
                got: parsed.embeddings.len(),
                expected: texts.len(),
            });
        }

        Ok(EmbeddingResponse {
            embeddings: parsed.embeddings,
            usage: EmbeddingUsage {
                prompt_tokens: parsed.prompt_eval_count,
                total_tokens: parsed.prompt_eval_count,
            },
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    prompt_eval_count: u64,
}
