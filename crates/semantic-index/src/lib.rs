//! Approximate nearest-neighbor search over a usearch HNSW index file.
//!
//! Indices are built offline with [`HnswIndexBuilder`] and opened with
//! [`HnswIndex`], whose lifecycle is `Unloaded -> Loaded`. Searches always
//! return exactly `k` hits; ranks that cannot be filled carry the sentinel
//! id from `core_types`.

use std::path::PathBuf;

use core_types::SearchHit;
use thiserror::Error;

pub mod ann;

pub use ann::builder::{BuildStats, HnswIndexBuilder};
pub use ann::hnsw::{HnswIndex, IndexStats, LoadOptions};
pub use ann::manifest::IndexManifest;
pub use core_types::config::IndexLoadMode;

/// Largest `k` a single search may request.
pub const MAX_K: usize = 10_000;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector index queried before load() completed")]
    NotLoaded,
    #[error("index io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt index: {0}")]
    Format(String),
    #[error("query vector has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("k must be between 1 and {max}, got {k}")]
    InvalidK { k: usize, max: usize },
    #[error("usearch: {0}")]
    Backend(String),
    #[error("index build failed: {0}")]
    Build(String),
}

pub(crate) fn backend(err: impl std::fmt::Display) -> IndexError {
    IndexError::Backend(err.to_string())
}

/// Read-only k-nearest-neighbor search.
///
/// Implementations return exactly `k` hits ordered by ascending distance,
/// padding unfilled ranks with sentinels. Sentinels only ever form a suffix.
pub trait VectorIndex: Send + Sync {
    fn dimension(&self) -> Result<usize, IndexError>;

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError>;
}
