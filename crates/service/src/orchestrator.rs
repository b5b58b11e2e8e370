//! Query orchestration: embed -> vector search -> batched lookup -> rows in
//! rank order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use core_types::{DocId, DocumentRecord, ResultRow, SearchHit};
use doc_store::{DocumentStore, StoreError};
use embedding::{Embedder, EmbeddingError};
use semantic_index::{IndexError, MAX_K, VectorIndex};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("vector index is not loaded")]
    IndexNotLoaded,
    #[error("vector search failed: {0}")]
    Index(#[source] IndexError),
    #[error("document lookup failed: {0}")]
    StoreUnavailable(#[source] StoreError),
}

impl QueryError {
    /// Errors after which no further query can succeed.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::IndexNotLoaded)
    }
}

impl From<IndexError> for QueryError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::NotLoaded => Self::IndexNotLoaded,
            other => Self::Index(other),
        }
    }
}

impl From<StoreError> for QueryError {
    fn from(err: StoreError) -> Self {
        Self::StoreUnavailable(err)
    }
}

/// Result of one query. `rows` is empty when the index had no valid hit.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub query_id: Uuid,
    pub query: String,
    pub k: usize,
    pub rows: Vec<ResultRow>,
    /// Embedding plus vector search.
    pub search_latency: Duration,
    pub lookup_latency: Duration,
}

impl SearchOutcome {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn missing(&self) -> usize {
        self.rows.iter().filter(|r| r.is_missing()).count()
    }
}

/// Stateless between calls; every collaborator is shared and read-only.
#[derive(Clone)]
pub struct QueryOrchestrator {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn DocumentStore>,
    default_k: usize,
    max_k: usize,
}

impl QueryOrchestrator {
    /// `default_k` must be positive; configuration validation guarantees it.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn DocumentStore>,
        default_k: usize,
    ) -> Self {
        debug_assert!(default_k > 0, "default_k must be at least 1");
        Self {
            embedder,
            index,
            store,
            default_k,
            max_k: MAX_K,
        }
    }

    /// Cap on caller-supplied `k`, never above what the index accepts.
    #[must_use]
    pub fn with_max_k(mut self, max_k: usize) -> Self {
        self.max_k = max_k.min(MAX_K);
        self
    }

    pub const fn default_k(&self) -> usize {
        self.default_k
    }

    pub const fn max_k(&self) -> usize {
        self.max_k
    }

    pub fn search(&self, query: &str, k: Option<usize>) -> Result<SearchOutcome, QueryError> {
        let query_id = Uuid::new_v4();
        let k = k.unwrap_or(self.default_k);
        if k == 0 || k > self.max_k {
            return Err(QueryError::InvalidQuery(format!(
                "k must be between 1 and {}, got {k}",
                self.max_k
            )));
        }
        let text = query.trim();
        if text.is_empty() {
            return Err(QueryError::InvalidQuery("query is empty".into()));
        }

        let started = Instant::now();
        let vector = self.embedder.embed(text)?;
        let hits = self.index.search(&vector, k)?;
        let search_latency = started.elapsed();

        let valid = valid_hits(&hits, query_id);
        let mut outcome = SearchOutcome {
            query_id,
            query: text.to_string(),
            k,
            rows: Vec::new(),
            search_latency,
            lookup_latency: Duration::ZERO,
        };
        if valid.is_empty() {
            debug!(%query_id, k, "no valid hits");
            return Ok(outcome);
        }

        let ids: HashSet<DocId> = valid.iter().map(|h| h.id).collect();
        let started = Instant::now();
        let records = self.store.batch_get(&ids)?;
        outcome.lookup_latency = started.elapsed();
        outcome.rows = assemble_rows(&valid, &records);

        info!(
            %query_id,
            k,
            hits = outcome.rows.len(),
            missing = outcome.missing(),
            search_ms = search_latency.as_secs_f64() * 1000.0,
            lookup_ms = outcome.lookup_latency.as_secs_f64() * 1000.0,
            "query complete"
        );
        Ok(outcome)
    }
}

/// Non-sentinel hits in rank order. Sentinels are expected only as trailing
/// padding; one followed by a real hit is dropped and logged.
fn valid_hits(hits: &[SearchHit], query_id: Uuid) -> Vec<SearchHit> {
    let mut seen_sentinel = false;
    let mut valid = Vec::with_capacity(hits.len());
    for hit in hits {
        if hit.is_sentinel() {
            seen_sentinel = true;
            continue;
        }
        if seen_sentinel {
            warn!(%query_id, rank = hit.rank, id = hit.id, "index returned a hit after sentinel padding");
        }
        valid.push(*hit);
    }
    valid
}

/// Join hits with looked-up records, one row per non-sentinel hit, in the
/// order of `hits`. Ids absent from `records` yield a row with no record.
pub fn assemble_rows(hits: &[SearchHit], records: &HashMap<DocId, DocumentRecord>) -> Vec<ResultRow> {
    hits.iter()
        .filter(|h| !h.is_sentinel())
        .map(|hit| ResultRow {
            rank: hit.rank,
            id: hit.id,
            distance: hit.distance,
            record: records.get(&hit.id).cloned(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: DocId, title: &str) -> DocumentRecord {
        DocumentRecord::new(id, title, format!("body of {title}"))
    }

    #[test]
    fn rows_follow_hit_order_not_map_order() {
        let hits = [
            SearchHit::new(30, 0.1, 0),
            SearchHit::new(10, 0.2, 1),
            SearchHit::new(20, 0.3, 2),
        ];
        let records = HashMap::from([(10, record(10, "b")), (20, record(20, "c")), (30, record(30, "a"))]);
        let rows = assemble_rows(&hits, &records);
        let ids: Vec<_> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, [30, 10, 20]);
        assert_eq!(rows[0].record.as_ref().unwrap().title, "a");
    }

    #[test]
    fn missing_record_keeps_its_row() {
        let hits = [
            SearchHit::new(1, 0.1, 0),
            SearchHit::new(2, 0.2, 1),
            SearchHit::new(42, 0.3, 2),
        ];
        let records = HashMap::from([(1, record(1, "x")), (2, record(2, "y"))]);
        let rows = assemble_rows(&hits, &records);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].id, 42);
        assert!(rows[2].is_missing());
    }

    #[test]
    fn sentinels_never_become_rows() {
        let hits = [
            SearchHit::new(5, 0.1, 0),
            SearchHit::sentinel(1),
            SearchHit::new(7, 0.4, 2),
            SearchHit::sentinel(3),
        ];
        let valid = valid_hits(&hits, Uuid::nil());
        assert_eq!(valid.iter().map(|h| h.id).collect::<Vec<_>>(), [5, 7]);
        assert_eq!(valid[1].rank, 2);
    }

    #[test]
    fn index_errors_map_to_query_errors() {
        assert!(QueryError::from(IndexError::NotLoaded).is_fatal());
        let err = QueryError::from(IndexError::DimensionMismatch { expected: 4, actual: 3 });
        assert!(matches!(err, QueryError::Index(_)));
        assert!(!err.is_fatal());
        assert!(!QueryError::InvalidQuery("x".into()).is_fatal());
    }
}
