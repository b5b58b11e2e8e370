//! JSON sidecar written next to every index file.
//!
//! usearch stores vectors and the graph; the manifest records the build
//! parameters needed to reopen the file with matching options and the
//! embedding model that produced the vectors.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::IndexError;

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub version: u32,
    pub dimension: usize,
    pub vectors: usize,
    /// HNSW graph degree (`M`).
    pub connectivity: usize,
    pub expansion_add: usize,
    /// Model id of the embedder that produced the vectors; empty when unknown.
    #[serde(default)]
    pub model: String,
}

impl IndexManifest {
    /// `<index file>.json`.
    pub fn path_for(index: &Path) -> PathBuf {
        let mut name = index.as_os_str().to_owned();
        name.push(".json");
        PathBuf::from(name)
    }

    pub fn read(index: &Path) -> Result<Self, IndexError> {
        let path = Self::path_for(index);
        let raw = fs::read(&path).map_err(|source| IndexError::Io {
            path: path.clone(),
            source,
        })?;
        let manifest: Self = serde_json::from_slice(&raw)
            .map_err(|e| IndexError::Format(format!("{}: {e}", path.display())))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(IndexError::Format(format!(
                "{}: unsupported manifest version {}",
                path.display(),
                manifest.version
            )));
        }
        if manifest.dimension == 0 {
            return Err(IndexError::Format(format!(
                "{}: dimension must be positive",
                path.display()
            )));
        }
        Ok(manifest)
    }

    /// Write through a temp file so readers never see a partial manifest.
    pub fn write(&self, index: &Path) -> Result<(), IndexError> {
        let path = Self::path_for(index);
        let tmp = super::builder::tmp_path(&path);
        let io_err = |source| IndexError::Io {
            path: path.clone(),
            source,
        };
        let body = serde_json::to_vec_pretty(self)
            .map_err(|e| IndexError::Build(format!("serialize manifest: {e}")))?;
        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(&body).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        fs::rename(&tmp, &path).map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> IndexManifest {
        IndexManifest {
            version: MANIFEST_VERSION,
            dimension: 4,
            vectors: 10,
            connectivity: 16,
            expansion_add: 128,
            model: "feature-hash-4".into(),
        }
    }

    #[test]
    fn sidecar_sits_next_to_index() {
        assert_eq!(
            IndexManifest::path_for(Path::new("/data/news.usearch")),
            Path::new("/data/news.usearch.json")
        );
    }

    #[test]
    fn written_manifest_reads_back() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("a.usearch");
        sample().write(&index).unwrap();
        assert_eq!(IndexManifest::read(&index).unwrap(), sample());
        assert!(!dir.path().join("a.usearch.json.tmp").exists());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("a.usearch");
        let mut m = sample();
        m.version = 99;
        fs::write(
            IndexManifest::path_for(&index),
            serde_json::to_vec(&m).unwrap(),
        )
        .unwrap();
        assert!(matches!(
            IndexManifest::read(&index),
            Err(IndexError::Format(_))
        ));
    }

    #[test]
    fn missing_manifest_is_io_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            IndexManifest::read(&dir.path().join("none.usearch")),
            Err(IndexError::Io { .. })
        ));
    }
}
