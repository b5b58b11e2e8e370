//! Builds the embedder, vector index and document store from configuration.
//! Everything is constructed once at startup and shared by `Arc`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use core_types::config::{
    AppConfig, EmbedderBackend, EmbedderConfig, IndexConfig, SearchConfig, StoreBackend,
    StoreConfig,
};
use doc_store::{DocumentStore, MemoryDocStore, RetryingStore, TantivyDocStore};
use embedding::{Embedder, HashEmbedder, HttpEmbedder, LocalEmbedder};
use semantic_index::{HnswIndex, IndexStats, LoadOptions, VectorIndex};

use crate::orchestrator::QueryOrchestrator;

pub struct Collaborators {
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<HnswIndex>,
    pub store: Arc<dyn DocumentStore>,
}

impl Collaborators {
    /// Open all three collaborators and check that the embedder matches the
    /// one the index was built with. The index is loaded before this returns.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let embedder = build_embedder(&cfg.embedder)?;
        let index = open_index(&cfg.index)?;
        let stats = index.stats()?;
        if stats.vectors > 0 && stats.dimension != embedder.dimension() {
            bail!(
                "embedder {} produces {}-dimensional vectors but index {} holds {}-dimensional vectors",
                embedder.model_id(),
                embedder.dimension(),
                cfg.index.path,
                stats.dimension
            );
        }
        if !stats.model.is_empty() && stats.model != embedder.model_id() {
            bail!(
                "index {} was built with embedder {} but {} is configured",
                cfg.index.path,
                stats.model,
                embedder.model_id()
            );
        }
        let store = open_store(&cfg.store)?;
        Ok(Self {
            embedder,
            index,
            store,
        })
    }

    pub fn orchestrator(&self, search: &SearchConfig) -> QueryOrchestrator {
        let index: Arc<dyn VectorIndex> = self.index.clone();
        QueryOrchestrator::new(
            Arc::clone(&self.embedder),
            index,
            Arc::clone(&self.store),
            search.default_k,
        )
        .with_max_k(search.max_k)
    }

    pub fn index_stats(&self) -> Result<IndexStats> {
        Ok(self.index.stats()?)
    }
}

pub fn build_embedder(cfg: &EmbedderConfig) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match cfg.backend {
        EmbedderBackend::Local => Arc::new(
            LocalEmbedder::from_config(cfg)
                .with_context(|| format!("load local embedding model {}", cfg.model))?,
        ),
        EmbedderBackend::Hash => Arc::new(HashEmbedder::from_config(cfg)),
        EmbedderBackend::Http => Arc::new(
            HttpEmbedder::from_config(cfg)
                .with_context(|| format!("create http embedder for {}", cfg.endpoint))?,
        ),
    };
    tracing::info!(
        backend = ?cfg.backend,
        model = embedder.model_id(),
        dimension = embedder.dimension(),
        "embedder ready"
    );
    Ok(embedder)
}

pub fn open_index(cfg: &IndexConfig) -> Result<Arc<HnswIndex>> {
    let options = LoadOptions {
        mode: cfg.load_mode,
        nprobe: cfg.nprobe,
    };
    let index = HnswIndex::open(Path::new(&cfg.path), options)
        .with_context(|| format!("load vector index {}", cfg.path))?;
    Ok(Arc::new(index))
}

/// Open the configured store wrapped in retry-with-backoff.
pub fn open_store(cfg: &StoreConfig) -> Result<Arc<dyn DocumentStore>> {
    let path = Path::new(&cfg.endpoint);
    let backoff = Duration::from_millis(cfg.retry_backoff_ms);
    let store: Arc<dyn DocumentStore> = match cfg.backend {
        StoreBackend::Tantivy => {
            let inner = TantivyDocStore::open(path)
                .with_context(|| format!("open document store {}", cfg.endpoint))?;
            Arc::new(
                RetryingStore::new(inner)
                    .with_attempts(cfg.retry_attempts)
                    .with_backoff(backoff),
            )
        }
        StoreBackend::Jsonl => {
            let inner = MemoryDocStore::from_jsonl(path)
                .with_context(|| format!("load document file {}", cfg.endpoint))?;
            Arc::new(
                RetryingStore::new(inner)
                    .with_attempts(cfg.retry_attempts)
                    .with_backoff(backoff),
            )
        }
    };
    Ok(store)
}
