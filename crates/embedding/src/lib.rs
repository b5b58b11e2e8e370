//! Text embedders: the `Embedder` contract plus the backends mmsearch ships.
//!
//! `LocalEmbedder` runs a sentence-transformer through fastembed and is the
//! default. `HttpEmbedder` talks to a model server. `HashEmbedder` is a
//! deterministic offline double for tests and smoke runs; it does not model
//! language.

mod hash;
mod http;
mod local;

pub use hash::HashEmbedder;
pub use http::HttpEmbedder;
pub use local::{LocalEmbedder, MODEL_MAX_TOKENS, known_model};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("cannot embed empty text")]
    EmptyInput,
    #[error("input has {tokens} tokens, model limit is {limit}")]
    TooLong { tokens: usize, limit: usize },
    #[error("model {model} returned {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },
    #[error("embedding request failed: {0}")]
    Request(String),
    #[error("malformed embedding response: {0}")]
    Response(String),
    #[error("embedding model error: {0}")]
    Model(String),
}

/// Maps text to a fixed-length vector. Implementations must be deterministic
/// for a fixed model version.
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Query embedding. Text over the token limit is rejected.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Document embedding for ingest. Long text is cut to the model limit
    /// instead of rejected.
    fn embed_document(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(text)
    }
}

/// Whitespace word count, for backends without access to a tokenizer.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// First `max_words` whitespace-separated words of `text`, single-spaced.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn ensure_not_empty(text: &str) -> Result<(), EmbeddingError> {
    if text.trim().is_empty() {
        return Err(EmbeddingError::EmptyInput);
    }
    Ok(())
}

pub(crate) fn ensure_within(tokens: usize, limit: usize) -> Result<(), EmbeddingError> {
    if tokens > limit {
        return Err(EmbeddingError::TooLong { tokens, limit });
    }
    Ok(())
}

/// Empty and word-limit checks for backends that count words.
pub fn validate_input(text: &str, max_tokens: usize) -> Result<(), EmbeddingError> {
    ensure_not_empty(text)?;
    ensure_within(count_words(text), max_tokens)
}

/// Scale `v` to unit length in place; zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
