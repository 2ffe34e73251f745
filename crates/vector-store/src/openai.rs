//! OpenAI-compatible embedding client.

use crate::embedder::{Embedder, EmbeddingResponse, EmbeddingUsage};
use crate::error::{Result, VectorStoreError};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Embeddings client for OpenAI-compatible `/embeddings` endpoints.
#[derive(Clone)]
pub struct OpenAiCompatEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
}

impl OpenAiCompatEmbedder {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(VectorStoreError::Config("missing embedder API key".into()));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(VectorStoreError::Config(format!(
                "embedder base URL must be http(s): {base_url}"
            )));
        }
        let model = model.into();
        if model.trim().is_empty() {
            return Err(VectorStoreError::Config("missing embedder model".into()));
        }

        let mut headers = reqwest::header::HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| VectorStoreError::Config("invalid embedder API key".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
            dimensions,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiCompatEmbedder {
    async fn create_embeddings(&self, texts: &[String]) -> Result<EmbeddingResponse> {
        if texts.is_empty() {
            return Ok(EmbeddingResponse {
                embeddings: Vec::new(),
                usage: EmbeddingUsage::default(),
            });
        }

        let request = EmbeddingRequest {
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

        let mut parsed: WireResponse = response.json().await?;
        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != texts.len() {
            return Err(VectorStoreError::CountMismatch {
                got: parsed.data.len(),
                expected: texts.len(),
            });
        }

        Ok(EmbeddingResponse {
            embeddings: parsed.data.into_iter().map(|d| d.embedding).collect(),
            usage: EmbeddingUsage {
                prompt_tokens: parsed.usage.prompt_tokens,
                total_tokens: parsed.usage.total_tokens,
            },
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    data: Vec<WireData>,
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
struct WireData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}
