use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use core_types::{DocId, DocumentRecord};

use crate::{DocumentStore, StoreError};

/// In-memory store for corpora small enough to hold in RAM.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocStore {
    docs: HashMap<DocId, DocumentRecord>,
}

impl MemoryDocStore {
    /// Later records with the same id replace earlier ones.
    pub fn from_records(records: impl IntoIterator<Item = DocumentRecord>) -> Self {
        let docs = records.into_iter().map(|r| (r.id, r)).collect();
        Self { docs }
    }

    pub fn from_jsonl(path: &Path) -> Result<Self, StoreError> {
        let records = read_jsonl(path)?;
        tracing::info!(path = %path.display(), documents = records.len(), "loaded jsonl document store");
        Ok(Self::from_records(records))
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

impl DocumentStore for MemoryDocStore {
    fn batch_get(&self, ids: &HashSet<DocId>) -> Result<HashMap<DocId, DocumentRecord>, StoreError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.docs.get(id).map(|doc| (*id, doc.clone())))
            .collect())
    }
}

/// Parse one `DocumentRecord` per non-blank line.
pub fn read_jsonl(path: &Path) -> Result<Vec<DocumentRecord>, StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;

    let mut records = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }
        let record: DocumentRecord = serde_json::from_str(&line).map_err(|e| {
            StoreError::Corrupt(format!("{}:{}: {e}", path.display(), idx + 1))
        })?;
        records.push(record);
    }
    Ok(records)
}
