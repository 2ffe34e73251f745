//! Host shell for the indexing engine: loads configuration, owns the
//! workspace registry, and drives index/watch/search/clear from the
//! command line.

use anyhow::{bail, Context, Result};
use atlas_indexer::{EngineConfig, IndexOrchestrator, IndexStatus, ProgressSnapshot};
use atlas_search::SearchService;
use atlas_vector_store::VectorStore;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "code-atlas", version, about = "Semantic code indexing and search")]
struct Cli {
    /// Path to the engine configuration file (TOML). Defaults to
    /// `<config dir>/code-atlas/config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan and index a workspace once, then exit.
    Index {
        /// Workspace root.
        path: PathBuf,
    },
    /// Index a workspace and keep it fresh until interrupted.
    Watch {
        /// Workspace root.
        path: PathBuf,
    },
    /// Query a previously indexed workspace.
    Search {
        /// Workspace root.
        path: PathBuf,
        /// Natural-language or code query.
        query: String,
        /// Maximum number of results.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Delete the workspace's vector collection and hash cache.
    Clear {
        /// Workspace root.
        path: PathBuf,
    },
    /// Show index status for a workspace.
    Status {
        /// Workspace root.
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Index { path } => index(&config, &path).await,
        Command::Watch { path } => watch(&config, &path).await,
        Command::Search { path, query, limit } => search(&config, &path, &query, limit).await,
        Command::Clear { path } => clear(&config, &path).await,
        Command::Status { path } => status(&config, &path).await,
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("code-atlas").join("config.toml"))
}

/// Read the TOML configuration and apply environment credential
/// overrides (`ATLAS_EMBEDDER_API_KEY`, `ATLAS_QDRANT_API_KEY`).
fn load_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => default_config_path().context("no platform config directory")?,
    };
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let mut config: EngineConfig =
        toml::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))?;
    log::debug!("Loaded configuration from {}", path.display());

    if let Ok(key) = std::env::var("ATLAS_EMBEDDER_API_KEY") {
        if let atlas_indexer::EmbedderConfig::OpenAiCompat { api_key, .. } = &mut config.embedder {
            *api_key = key;
        }
    }
    if let Ok(key) = std::env::var("ATLAS_QDRANT_API_KEY") {
        config.vector_store.api_key = Some(key);
    }

    Ok(config)
}

async fn build_engine(config: &EngineConfig, path: &Path) -> Result<Arc<IndexOrchestrator>> {
    let engine = IndexOrchestrator::from_config(path, config).await?;
    Ok(Arc::new(engine))
}

async fn index(config: &EngineConfig, path: &Path) -> Result<()> {
    let engine = build_engine(config, path).await?;
    let stats = engine.start_indexing().await?;
    engine.dispose().await;

    println!(
        "Indexed {} files ({} blocks, {} skipped) in {}ms",
        stats.processed_files, stats.indexed_blocks, stats.skipped_files, stats.time_ms
    );
    for error in &stats.errors {
        eprintln!("warning: {error}");
    }
    Ok(())
}

async fn watch(config: &EngineConfig, path: &Path) -> Result<()> {
    let engine = build_engine(config, path).await?;
    let mut progress = engine.state().subscribe();

    let stats = engine.start_indexing().await?;
    println!(
        "Initial scan done: {} files, {} blocks. Watching for changes (ctrl-c to stop)...",
        stats.processed_files, stats.indexed_blocks
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = progress.changed() => {
                if changed.is_err() {
                    break;
                }
                print_progress(&progress.borrow().clone());
            }
        }
    }

    engine.dispose().await;
    println!("Stopped.");
    Ok(())
}

async fn search(config: &EngineConfig, path: &Path, query: &str, limit: usize) -> Result<()> {
    config.validate()?;
    let embedder = config.build_embedder()?;
    let store = config.build_store(path)?;

    // Restore queryability from the store itself; this process never ran
    // a scan, but an existing collection is searchable.
    let state = Arc::new(atlas_indexer::IndexState::new());
    if store.collection_exists().await? {
        state.set_status(IndexStatus::Indexed, "existing collection");
    }

    let service = SearchService::new(embedder, store, state);
    let hits = service.search(query, limit).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for hit in hits {
        println!(
            "{:.3}  {}:{}-{}",
            hit.score, hit.file_path, hit.start_line, hit.end_line
        );
        for line in hit.content.lines().take(3) {
            println!("    {line}");
        }
    }
    Ok(())
}

async fn clear(config: &EngineConfig, path: &Path) -> Result<()> {
    let engine = build_engine(config, path).await?;
    engine.clear_index_data().await?;
    println!("Index data cleared for {}", path.display());
    Ok(())
}

async fn status(config: &EngineConfig, path: &Path) -> Result<()> {
    config.validate()?;
    let store = config.build_store(path)?;
    let exists = store.collection_exists().await?;

    if !path.exists() {
        bail!("workspace {} does not exist", path.display());
    }
    println!("workspace:  {}", path.display());
    println!("collection: {}", if exists { "present" } else { "absent" });
    Ok(())
}

fn print_progress(snapshot: &ProgressSnapshot) {
    let status = match snapshot.status {
        IndexStatus::Standby => "standby",
        IndexStatus::Indexing => "indexing",
        IndexStatus::Indexed => "indexed",
        IndexStatus::Error => "error",
    };
    println!(
        "[{status}] {}/{} blocks {}",
        snapshot.processed_blocks, snapshot.total_blocks, snapshot.message
    );
}
