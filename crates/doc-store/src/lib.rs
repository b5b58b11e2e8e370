//! Document stores: batched id -> record lookup.
//!
//! `TantivyDocStore` is the on-disk store (indexed `uid` field);
//! `MemoryDocStore` serves small corpora straight from JSONL;
//! `RetryingStore` wraps either with backoff on transient failures.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use core_types::{DocId, DocumentRecord};
use thiserror::Error;

mod memory;
mod retry;
mod tantivy_store;

pub use memory::{MemoryDocStore, read_jsonl};
pub use retry::RetryingStore;
pub use tantivy_store::{TantivyDocStore, TantivyDocStoreWriter};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt document store data: {0}")]
    Corrupt(String),
    #[error("document store io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Transient failures worth another attempt.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Batched lookup by id. The returned map holds only ids that exist and
/// carries no ordering.
pub trait DocumentStore: Send + Sync {
    fn batch_get(&self, ids: &HashSet<DocId>) -> Result<HashMap<DocId, DocumentRecord>, StoreError>;
}

impl<T: DocumentStore + ?Sized> DocumentStore for Box<T> {
    fn batch_get(&self, ids: &HashSet<DocId>) -> Result<HashMap<DocId, DocumentRecord>, StoreError> {
        (**self).batch_get(ids)
    }
}

impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    fn batch_get(&self, ids: &HashSet<DocId>) -> Result<HashMap<DocId, DocumentRecord>, StoreError> {
        (**self).batch_get(ids)
    }
}
