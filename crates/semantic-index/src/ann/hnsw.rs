use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use core_types::config::IndexLoadMode;
use core_types::{DocId, SearchHit};
use tracing::{debug, info};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use super::manifest::IndexManifest;
use crate::{IndexError, MAX_K, VectorIndex, backend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    pub mode: IndexLoadMode,
    /// Search-time candidate list size (`ef`). Larger values trade latency
    /// for recall; usearch never explores fewer than `k` candidates.
    pub nprobe: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            mode: IndexLoadMode::Mmap,
            nprobe: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub dimension: usize,
    pub vectors: usize,
    pub connectivity: usize,
    pub expansion_search: usize,
    pub mode: IndexLoadMode,
    pub model: String,
    pub file_bytes: u64,
}

struct Loaded {
    /// `None` for an index built from zero vectors.
    index: Option<Index>,
    manifest: IndexManifest,
    file_bytes: u64,
}

/// HNSW index over a usearch file.
///
/// Created unloaded; [`HnswIndex::load`] either maps the file (`view`) or
/// reads it fully (`load`). Every search before that fails with
/// [`IndexError::NotLoaded`].
pub struct HnswIndex {
    path: PathBuf,
    options: LoadOptions,
    state: OnceLock<Loaded>,
}

impl fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HnswIndex")
            .field("path", &self.path)
            .field("options", &self.options)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl HnswIndex {
    pub fn new(path: impl Into<PathBuf>, options: LoadOptions) -> Self {
        Self {
            path: path.into(),
            options,
            state: OnceLock::new(),
        }
    }

    /// `new` followed by `load`.
    pub fn open(path: impl Into<PathBuf>, options: LoadOptions) -> Result<Self, IndexError> {
        let index = Self::new(path, options);
        index.load()?;
        Ok(index)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.state.get().is_some()
    }

    /// Load the file once; later calls are no-ops.
    pub fn load(&self) -> Result<(), IndexError> {
        if self.is_loaded() {
            return Ok(());
        }
        let manifest = IndexManifest::read(&self.path)?;
        let file_bytes = fs::metadata(&self.path)
            .map_err(|source| IndexError::Io {
                path: self.path.clone(),
                source,
            })?
            .len();

        let index = if manifest.vectors == 0 {
            None
        } else {
            Some(self.open_usearch(&manifest)?)
        };

        info!(
            path = %self.path.display(),
            mode = ?self.options.mode,
            vectors = manifest.vectors,
            dimension = manifest.dimension,
            expansion_search = self.options.nprobe,
            "hnsw index loaded"
        );
        // A concurrent loader may have won; both read the same file.
        let _ = self.state.set(Loaded {
            index,
            manifest,
            file_bytes,
        });
        Ok(())
    }

    fn open_usearch(&self, manifest: &IndexManifest) -> Result<Index, IndexError> {
        let path = self
            .path
            .to_str()
            .ok_or_else(|| IndexError::Format(format!("{} is not valid UTF-8", self.path.display())))?;
        let index = Index::new(&IndexOptions {
            dimensions: manifest.dimension,
            metric: MetricKind::L2sq,
            quantization: ScalarKind::F32,
            connectivity: manifest.connectivity,
            expansion_add: manifest.expansion_add,
            expansion_search: self.options.nprobe,
            ..Default::default()
        })
        .map_err(backend)?;
        match self.options.mode {
            IndexLoadMode::Mmap => index.view(path),
            IndexLoadMode::Memory => index.load(path),
        }
        .map_err(|e| IndexError::Format(format!("{}: {e}", self.path.display())))?;

        if index.dimensions() != manifest.dimension || index.size() != manifest.vectors {
            return Err(IndexError::Format(format!(
                "{}: file holds {} vectors of dimension {}, manifest says {} of {}",
                self.path.display(),
                index.size(),
                index.dimensions(),
                manifest.vectors,
                manifest.dimension
            )));
        }
        index.change_expansion_search(self.options.nprobe);
        Ok(index)
    }

    fn loaded(&self) -> Result<&Loaded, IndexError> {
        self.state.get().ok_or(IndexError::NotLoaded)
    }

    pub fn stats(&self) -> Result<IndexStats, IndexError> {
        let loaded = self.loaded()?;
        Ok(IndexStats {
            dimension: loaded.manifest.dimension,
            vectors: loaded.manifest.vectors,
            connectivity: loaded.manifest.connectivity,
            expansion_search: self.options.nprobe,
            mode: self.options.mode,
            model: loaded.manifest.model.clone(),
            file_bytes: loaded.file_bytes,
        })
    }
}

impl VectorIndex for HnswIndex {
    fn dimension(&self) -> Result<usize, IndexError> {
        Ok(self.loaded()?.manifest.dimension)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        let loaded = self.loaded()?;
        if k == 0 || k > MAX_K {
            return Err(IndexError::InvalidK { k, max: MAX_K });
        }
        if query.len() != loaded.manifest.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: loaded.manifest.dimension,
                actual: query.len(),
            });
        }

        let mut hits = Vec::with_capacity(k);
        if let Some(index) = &loaded.index {
            let count = k.min(index.size());
            if count > 0 {
                let found = index.search(query, count).map_err(backend)?;
                for (&key, &distance) in found.keys.iter().zip(&found.distances) {
                    let id = DocId::try_from(key).map_err(|_| {
                        IndexError::Format(format!("key {key} does not fit a document id"))
                    })?;
                    hits.push(SearchHit::new(id, distance, hits.len()));
                }
            }
        }
        let filled = hits.len();
        while hits.len() < k {
            hits.push(SearchHit::sentinel(hits.len()));
        }
        debug!(k, filled, "hnsw search");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HnswIndexBuilder;
    use tempfile::{TempDir, tempdir};

    /// 40 points on a 2-D grid, ids 100..140.
    fn grid_index(mode: IndexLoadMode) -> (TempDir, HnswIndex) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grid.usearch");
        let mut b = HnswIndexBuilder::new(2);
        for i in 0..40 {
            b.add(100 + i, vec![(i % 8) as f32, (i / 8) as f32]).unwrap();
        }
        b.write(&path).unwrap();
        let index = HnswIndex::open(&path, LoadOptions { mode, nprobe: 64 }).unwrap();
        (dir, index)
    }

    #[test]
    fn search_before_load_fails() {
        let index = HnswIndex::new("/nonexistent/grid.usearch", LoadOptions::default());
        assert!(!index.is_loaded());
        assert!(matches!(index.search(&[0.0, 0.0], 3), Err(IndexError::NotLoaded)));
        assert!(matches!(index.dimension(), Err(IndexError::NotLoaded)));
        assert!(matches!(index.stats(), Err(IndexError::NotLoaded)));
    }

    #[test]
    fn missing_file_fails_load_and_stays_unloaded() {
        let index = HnswIndex::new("/nonexistent/grid.usearch", LoadOptions::default());
        assert!(index.load().is_err());
        assert!(!index.is_loaded());
    }

    #[test]
    fn exact_vector_ranks_first_and_distances_ascend() {
        let (_dir, index) = grid_index(IndexLoadMode::Mmap);
        let hits = index.search(&[3.0, 2.0], 5).unwrap();
        assert_eq!(hits.len(), 5);
        assert_eq!(hits[0].id, 100 + 2 * 8 + 3);
        assert!(hits[0].distance.abs() < 1e-6);
        for (rank, pair) in hits.windows(2).enumerate() {
            assert!(pair[0].distance <= pair[1].distance);
            assert_eq!(pair[0].rank, rank);
        }
        assert!(hits.iter().all(|h| !h.is_sentinel()));
    }

    #[test]
    fn short_result_is_sentinel_padded() {
        let (_dir, index) = grid_index(IndexLoadMode::Memory);
        let hits = index.search(&[0.0, 0.0], 45).unwrap();
        assert_eq!(hits.len(), 45);
        assert!(hits[..40].iter().all(|h| !h.is_sentinel()));
        assert!(hits[40..].iter().all(SearchHit::is_sentinel));
        assert_eq!(hits[44].rank, 44);
    }

    #[test]
    fn empty_index_returns_only_sentinels() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.usearch");
        HnswIndexBuilder::new(4).write(&path).unwrap();
        let index = HnswIndex::open(&path, LoadOptions::default()).unwrap();
        let hits = index.search(&[0.0; 4], 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(SearchHit::is_sentinel));
        assert_eq!(index.stats().unwrap().vectors, 0);
    }

    #[test]
    fn memory_and_mmap_modes_agree() {
        let (_a, mapped) = grid_index(IndexLoadMode::Mmap);
        let (_b, owned) = grid_index(IndexLoadMode::Memory);
        for q in [[0.5, 0.5], [7.0, 4.0], [3.2, 1.9]] {
            let ids = |i: &HnswIndex| -> Vec<DocId> {
                i.search(&q, 4).unwrap().iter().map(|h| h.id).collect()
            };
            assert_eq!(ids(&mapped), ids(&owned));
        }
        assert_eq!(mapped.stats().unwrap().mode, IndexLoadMode::Mmap);
        assert_eq!(owned.stats().unwrap().mode, IndexLoadMode::Memory);
    }

    #[test]
    fn wrong_dimension_and_zero_k_are_rejected() {
        let (_dir, index) = grid_index(IndexLoadMode::Mmap);
        assert!(matches!(
            index.search(&[1.0, 2.0, 3.0], 3),
            Err(IndexError::DimensionMismatch { expected: 2, actual: 3 })
        ));
        assert!(matches!(
            index.search(&[1.0, 2.0], 0),
            Err(IndexError::InvalidK { k: 0, .. })
        ));
    }

    #[test]
    fn huge_k_is_rejected_without_allocating() {
        let (_dir, index) = grid_index(IndexLoadMode::Mmap);
        assert!(matches!(
            index.search(&[0.0, 0.0], usize::MAX),
            Err(IndexError::InvalidK { k: usize::MAX, max: MAX_K })
        ));
        assert!(index.search(&[0.0, 0.0], MAX_K + 1).is_err());
        let hits = index.search(&[0.0, 0.0], MAX_K).unwrap();
        assert_eq!(hits.len(), MAX_K);
        assert_eq!(hits.iter().filter(|h| !h.is_sentinel()).count(), 40);
    }

    #[test]
    fn truncated_file_is_rejected() {
        let (dir, _index) = grid_index(IndexLoadMode::Memory);
        let path = dir.path().join("grid.usearch");
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..8]).unwrap();
        for mode in [IndexLoadMode::Memory, IndexLoadMode::Mmap] {
            let index = HnswIndex::new(&path, LoadOptions { mode, nprobe: 8 });
            assert!(index.load().is_err());
            assert!(!index.is_loaded());
        }
    }

    #[test]
    fn load_is_idempotent_and_search_repeatable() {
        let (_dir, index) = grid_index(IndexLoadMode::Mmap);
        index.load().unwrap();
        let first = index.search(&[5.5, 3.5], 6).unwrap();
        assert_eq!(first, index.search(&[5.5, 3.5], 6).unwrap());
    }

    #[test]
    fn stats_report_build_and_load_parameters() {
        let (_dir, index) = grid_index(IndexLoadMode::Mmap);
        let stats = index.stats().unwrap();
        assert_eq!(stats.dimension, 2);
        assert_eq!(stats.vectors, 40);
        assert_eq!(stats.expansion_search, 64);
        assert!(stats.file_bytes > 0);
    }
}
