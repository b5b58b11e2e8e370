use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use core_types::DocId;
use tracing::info;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use super::manifest::{IndexManifest, MANIFEST_VERSION};
use crate::{IndexError, backend};

pub const DEFAULT_CONNECTIVITY: usize = 16;
pub const DEFAULT_EXPANSION_ADD: usize = 128;

/// Summary of a written index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    pub dimension: usize,
    pub vectors: usize,
    pub connectivity: usize,
}

/// Collects vectors in memory and writes a usearch HNSW file plus its
/// manifest in one step.
pub struct HnswIndexBuilder {
    dimension: usize,
    connectivity: usize,
    expansion_add: usize,
    model: String,
    ids: HashSet<DocId>,
    entries: Vec<(u64, Vec<f32>)>,
}

impl HnswIndexBuilder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            connectivity: DEFAULT_CONNECTIVITY,
            expansion_add: DEFAULT_EXPANSION_ADD,
            model: String::new(),
            ids: HashSet::new(),
            entries: Vec::new(),
        }
    }

    /// Graph degree; 0 keeps the default.
    pub fn with_connectivity(mut self, connectivity: usize) -> Self {
        if connectivity > 0 {
            self.connectivity = connectivity;
        }
        self
    }

    /// Candidate list size during insertion; 0 keeps the default.
    pub fn with_expansion_add(mut self, expansion_add: usize) -> Self {
        if expansion_add > 0 {
            self.expansion_add = expansion_add;
        }
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add(&mut self, id: DocId, vector: Vec<f32>) -> Result<(), IndexError> {
        let key = u64::try_from(id)
            .map_err(|_| IndexError::Build(format!("document id {id} is negative")))?;
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if !self.ids.insert(id) {
            return Err(IndexError::Build(format!("document id {id} added twice")));
        }
        self.entries.push((key, vector));
        Ok(())
    }

    /// Build the graph and write it to `path` via a temp file and rename.
    pub fn write(self, path: &Path) -> Result<BuildStats, IndexError> {
        if self.dimension == 0 {
            return Err(IndexError::Build("dimension must be positive".into()));
        }
        let options = IndexOptions {
            dimensions: self.dimension,
            metric: MetricKind::L2sq,
            quantization: ScalarKind::F32,
            connectivity: self.connectivity,
            expansion_add: self.expansion_add,
            ..Default::default()
        };
        let index = Index::new(&options).map_err(backend)?;
        index.reserve(self.entries.len()).map_err(backend)?;
        for (key, vector) in &self.entries {
            index.add(*key, vector.as_slice()).map_err(backend)?;
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| IndexError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let tmp = tmp_path(path);
        let tmp_str = tmp
            .to_str()
            .ok_or_else(|| IndexError::Build(format!("{} is not valid UTF-8", tmp.display())))?;
        index.save(tmp_str).map_err(backend)?;
        fs::rename(&tmp, path).map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let stats = BuildStats {
            dimension: self.dimension,
            vectors: self.entries.len(),
            connectivity: self.connectivity,
        };
        IndexManifest {
            version: MANIFEST_VERSION,
            dimension: stats.dimension,
            vectors: stats.vectors,
            connectivity: self.connectivity,
            expansion_add: self.expansion_add,
            model: self.model,
        }
        .write(path)?;

        info!(
            path = %path.display(),
            vectors = stats.vectors,
            dimension = stats.dimension,
            connectivity = stats.connectivity,
            "hnsw index written"
        );
        Ok(stats)
    }
}

pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
