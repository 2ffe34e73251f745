//! Qdrant REST adapter.

use crate::error::{Result, VectorStoreError};
use crate::record::{RecordPayload, SearchHit, VectorRecord};
use crate::store::VectorStore;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Vector store backed by a Qdrant collection, one collection per workspace.
pub struct QdrantVectorStore {
    client: Client,
    base_url: String,
    collection: String,
    vector_size: usize,
}

impl QdrantVectorStore {
    pub fn new(
        url: &str,
        api_key: Option<&str>,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Result<Self> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(VectorStoreError::Config(format!(
                "Qdrant URL must be http(s): {url}"
            )));
        }
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            headers.insert(
                "api-key",
                HeaderValue::from_str(key.trim())
                    .map_err(|_| VectorStoreError::Config("invalid Qdrant API key".into()))?,
            );
        }
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            collection: collection.into(),
            vector_size,
        })
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{suffix}", self.base_url, self.collection)
    }

    async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        Err(VectorStoreError::from_status(status, body))
    }

    async fn delete_by_filter(&self, filter: serde_json::Value) -> Result<()> {
        let response = self
            .client
            .post(self.collection_url("/points/delete?wait=true"))
            .json(&json!({ "filter": filter }))
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn initialize(&self) -> Result<bool> {
        if self.collection_exists().await? {
            return Ok(false);
        }

        log::info!(
            "Creating Qdrant collection {} (size={})",
            self.collection,
            self.vector_size
        );
        let body = json!({
            "vectors": { "size": self.vector_size, "distance": "Cosine" }
        });
        let response = self
            .client
            .put(self.collection_url(""))
            .json(&body)
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(true)
    }

    async fn upsert_points(&self, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let points: Vec<WirePoint> = records
            .iter()
            .map(|r| WirePoint {
                id: r.id.clone(),
                vector: r.vector.clone(),
                payload: r.payload.clone(),
            })
            .collect();
        let response = self
            .client
            .put(self.collection_url("/points?wait=true"))
            .json(&json!({ "points": points }))
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        let body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        let response = self
            .client
            .post(self.collection_url("/points/search"))
            .json(&body)
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        let parsed: SearchResponse = response.json().await?;

        Ok(parsed
            .result
            .into_iter()
            .map(|hit| SearchHit {
                file_path: hit.payload.file_path,
                score: hit.score,
                start_line: hit.payload.start_line,
                end_line: hit.payload.end_line,
                content: hit.payload.content,
            })
            .collect())
    }

    async fn delete_points_by_file_path(&self, file_path: &str) -> Result<()> {
        self.delete_points_by_file_paths(std::slice::from_ref(&file_path.to_string()))
            .await
    }

    async fn delete_points_by_file_paths(&self, file_paths: &[String]) -> Result<()> {
        if file_paths.is_empty() {
            return Ok(());
        }
        self.delete_by_filter(json!({
            "must": [{ "key": "file_path", "match": { "any": file_paths } }]
        }))
        .await
    }

    async fn clear_collection(&self) -> Result<()> {
        self.delete_by_filter(json!({})).await
    }

    async fn delete_collection(&self) -> Result<()> {
        let response = self
            .client
            .delete(self.collection_url(""))
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn collection_exists(&self) -> Result<bool> {
        let response = self
            .client
            .get(self.collection_url("/exists"))
            .send()
            .await?;
        let response = Self::expect_success(response).await?;
        let parsed: ExistsResponse = response.json().await?;
        Ok(parsed.result.exists)
    }
}

#[derive(Serialize)]
struct WirePoint {
    id: String,
    vector: Vec<f32>,
    payload: RecordPayload,
}

#[derive(Deserialize)]
struct ExistsResponse {
    result: ExistsResult,
}

#[derive(Deserialize)]
struct ExistsResult {
    exists: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<WireHit>,
}

#[derive(Deserialize)]
struct WireHit {
    score: f32,
    payload: RecordPayload,
}
