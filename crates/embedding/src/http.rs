use std::time::Duration;

use core_types::config::EmbedderConfig;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::{Embedder, EmbeddingError, truncate_words, validate_input};

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Blocking client for an Ollama-compatible `/api/embeddings` endpoint.
///
/// The client (and its connection pool) is built once and reused for every query.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimension: usize,
    max_tokens: usize,
}

impl HttpEmbedder {
    pub fn from_config(cfg: &EmbedderConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            dimension: cfg.dimension,
            max_tokens: cfg.max_tokens,
        })
    }

    fn decode(&self, body: &str) -> Result<Vec<f32>, EmbeddingError> {
        let parsed: EmbedResponse =
            serde_json::from_str(body).map_err(|e| EmbeddingError::Response(e.to_string()))?;
        if parsed.embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                model: self.model.clone(),
                expected: self.dimension,
                actual: parsed.embedding.len(),
            });
        }
        Ok(parsed.embedding)
    }
}

impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        validate_input(text, self.max_tokens)?;

        let request = EmbedRequest {
            model: &self.model,
            prompt: text,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;
        if !status.is_success() {
            tracing::warn!(endpoint = %self.endpoint, %status, "embedding endpoint rejected request");
            return Err(EmbeddingError::Request(format!("{status}: {body}")));
        }
        self.decode(&body)
    }

    /// The server's tokenizer is not visible here, so documents are cut by words.
    fn embed_document(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(&truncate_words(text, self.max_tokens))
    }
}
