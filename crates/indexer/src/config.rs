use crate::error::{IndexerError, Result};
use atlas_vector_store::{
    collection_name_for_workspace, Embedder, OllamaEmbedder, OpenAiCompatEmbedder,
    QdrantVectorStore, VectorStore,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Engine configuration supplied by the host. The provider choice is
/// resolved once, at construction time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    pub enabled: bool,
    /// Application-private storage root for per-workspace cache files.
    /// Defaults to the platform data directory.
    #[serde(default)]
    pub storage_root: Option<PathBuf>,
    pub embedder: EmbedderConfig,
    pub vector_store: QdrantConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum EmbedderConfig {
    OpenAiCompat {
        base_url: String,
        api_key: String,
        model: String,
        dimensions: usize,
    },
    Ollama {
        base_url: String,
        model: String,
        dimensions: usize,
    },
}

impl EmbedderConfig {
    fn dimensions(&self) -> usize {
        match self {
            Self::OpenAiCompat { dimensions, .. } | Self::Ollama { dimensions, .. } => *dimensions,
        }
    }

    /// True when a change makes previously stored vectors meaningless.
    fn is_compatible_with(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::OpenAiCompat {
                    model, dimensions, ..
                },
                Self::OpenAiCompat {
                    model: other_model,
                    dimensions: other_dimensions,
                    ..
                },
            )
            | (
                Self::Ollama {
                    model, dimensions, ..
                },
                Self::Ollama {
                    model: other_model,
                    dimensions: other_dimensions,
                    ..
                },
            ) => model == other_model && dimensions == other_dimensions,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QdrantConfig {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// What the orchestrator must do about a configuration change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigDelta {
    pub requires_restart: bool,
    pub requires_clear: bool,
}

impl EngineConfig {
    /// Fail fast on configuration the services would reject anyway;
    /// nothing is retried for these.
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Err(IndexerError::Config("indexing is disabled".into()));
        }
        if self.vector_store.url.trim().is_empty() {
            return Err(IndexerError::Config("missing vector store URL".into()));
        }
        match &self.embedder {
            EmbedderConfig::OpenAiCompat {
                base_url, api_key, model, ..
            } => {
                if base_url.trim().is_empty() || model.trim().is_empty() {
                    return Err(IndexerError::Config("incomplete embedder settings".into()));
                }
                if api_key.trim().is_empty() {
                    return Err(IndexerError::Config("missing embedder API key".into()));
                }
            }
            EmbedderConfig::Ollama { base_url, model, .. } => {
                if base_url.trim().is_empty() || model.trim().is_empty() {
                    return Err(IndexerError::Config("incomplete embedder settings".into()));
                }
            }
        }
        Ok(())
    }

    /// Compare a freshly loaded configuration against the running one.
    /// An incompatible embedder or a different store invalidates every
    /// stored vector; credential-only changes just need a restart.
    pub fn delta(old: &Self, new: &Self) -> ConfigDelta {
        if old == new {
            return ConfigDelta::default();
        }

        let requires_clear = !old.embedder.is_compatible_with(&new.embedder)
            || old.vector_store.url != new.vector_store.url;

        ConfigDelta {
            requires_restart: true,
            requires_clear,
        }
    }

    pub fn build_embedder(&self) -> Result<Arc<dyn Embedder>> {
        let embedder: Arc<dyn Embedder> = match &self.embedder {
            EmbedderConfig::OpenAiCompat {
                base_url,
                api_key,
                model,
                dimensions,
            } => Arc::new(
                OpenAiCompatEmbedder::new(api_key, base_url, model.clone(), *dimensions)
                    .map_err(|e| IndexerError::Config(e.to_string()))?,
            ),
            EmbedderConfig::Ollama {
                base_url,
                model,
                dimensions,
            } => Arc::new(
                OllamaEmbedder::new(base_url, model.clone(), *dimensions)
                    .map_err(|e| IndexerError::Config(e.to_string()))?,
            ),
        };
        Ok(embedder)
    }

    pub fn build_store(&self, workspace_root: &Path) -> Result<Arc<dyn VectorStore>> {
        let store = QdrantVectorStore::new(
            &self.vector_store.url,
            self.vector_store.api_key.as_deref(),
            collection_name_for_workspace(workspace_root),
            self.embedder.dimensions(),
        )
        .map_err(|e| IndexerError::Config(e.to_string()))?;
        Ok(Arc::new(store))
    }

    /// Storage root for cache files, falling back to the platform data dir.
    pub fn resolve_storage_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.storage_root {
            return Ok(root.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join("code-atlas"))
            .ok_or_else(|| IndexerError::Config("no platform data directory".into()))
    }
}
