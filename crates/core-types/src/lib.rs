//! Core identifiers and shared lightweight types for mmsearch.
//!
//! These types are shared by the index, the document store, and the query
//! orchestrator, so they stay free of heavy dependencies.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod config;

/// Integer identifier joining index entries to stored documents.
pub type DocId = i64;

/// Identifier the vector index emits for "no neighbor at this rank".
pub const SENTINEL_ID: DocId = -1;

/// Distance reported alongside sentinel padding.
pub const SENTINEL_DISTANCE: f32 = f32::MAX;

/// One ranked neighbor returned by a vector index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: DocId,
    pub distance: f32,
    /// Zero-based position in the index's ranking.
    pub rank: usize,
}

impl SearchHit {
    pub const fn new(id: DocId, distance: f32, rank: usize) -> Self {
        Self { id, distance, rank }
    }

    /// Padding entry for a rank the index could not fill.
    pub const fn sentinel(rank: usize) -> Self {
        Self {
            id: SENTINEL_ID,
            distance: SENTINEL_DISTANCE,
            rank,
        }
    }

    pub const fn is_sentinel(&self) -> bool {
        self.id == SENTINEL_ID
    }
}

/// A stored document. Anything beyond `uid`, `title` and `content` lands in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    #[serde(rename = "uid", alias = "id")]
    pub id: DocId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DocumentRecord {
    pub fn new(id: DocId, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            content: content.into(),
            extra: BTreeMap::new(),
        }
    }

    /// Text fed to the embedder when the document is indexed.
    pub fn embedding_text(&self) -> String {
        if self.title.is_empty() {
            self.content.clone()
        } else {
            format!("{}\n{}", self.title, self.content)
        }
    }
}

/// Final presentation unit: one per valid hit, in rank order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub rank: usize,
    pub id: DocId,
    pub distance: f32,
    /// `None` when the store has no record for `id`.
    pub record: Option<DocumentRecord>,
}

impl ResultRow {
    pub const fn is_missing(&self) -> bool {
        self.record.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_recognised() {
        let hit = SearchHit::sentinel(2);
        assert!(hit.is_sentinel());
        assert_eq!(hit.rank, 2);
        assert!(!SearchHit::new(0, 0.5, 0).is_sentinel());
    }

    #[test]
    fn record_keeps_unknown_fields() {
        let line = r#"{"uid": 7, "title": "t", "content": "c", "source": "wire", "year": 2021}"#;
        let record: DocumentRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(record.extra.len(), 2);
        assert_eq!(record.extra["source"], serde_json::json!("wire"));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["uid"], 7);
        assert_eq!(back["year"], 2021);
    }

    #[test]
    fn embedding_text_skips_empty_title() {
        assert_eq!(DocumentRecord::new(1, "", "body").embedding_text(), "body");
        assert_eq!(DocumentRecord::new(1, "T", "body").embedding_text(), "T\nbody");
    }
}
