use std::path::PathBuf;

use core_types::config::EmbedderConfig;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use tracing::info;

use crate::{Embedder, EmbeddingError, ensure_not_empty, ensure_within, l2_normalize};

/// Sequence length every supported model was trained with, special tokens included.
pub const MODEL_MAX_TOKENS: usize = 512;

/// Models `LocalEmbedder` can run, keyed by the names accepted in
/// `embedder.model`, with their output dimension.
const MODELS: &[(&str, EmbeddingModel, usize)] = &[
    ("all-MiniLM-L6-v2", EmbeddingModel::AllMiniLML6V2, 384),
    ("sentence-transformers/all-MiniLM-L6-v2", EmbeddingModel::AllMiniLML6V2, 384),
    ("all-MiniLM-L12-v2", EmbeddingModel::AllMiniLML12V2, 384),
    ("sentence-transformers/all-MiniLM-L12-v2", EmbeddingModel::AllMiniLML12V2, 384),
    ("bge-small-en-v1.5", EmbeddingModel::BGESmallENV15, 384),
    ("BAAI/bge-small-en-v1.5", EmbeddingModel::BGESmallENV15, 384),
    ("bge-base-en-v1.5", EmbeddingModel::BGEBaseENV15, 768),
    ("BAAI/bge-base-en-v1.5", EmbeddingModel::BGEBaseENV15, 768),
];

/// fastembed model and output dimension for a configured model name.
pub fn known_model(name: &str) -> Option<(EmbeddingModel, usize)> {
    MODELS
        .iter()
        .find(|(alias, _, _)| *alias == name)
        .map(|(_, model, dim)| (model.clone(), *dim))
}

/// Sentence-transformer run in-process through ONNX Runtime.
///
/// Model files are fetched into `embedder.cache_dir` on first use. Query
/// length is measured with the model's own tokenizer.
pub struct LocalEmbedder {
    model: Mutex<TextEmbedding>,
    name: String,
    dimension: usize,
    max_tokens: usize,
}

impl LocalEmbedder {
    pub fn from_config(cfg: &EmbedderConfig) -> Result<Self, EmbeddingError> {
        let (model, dimension) = check_config(cfg)?;
        let options = InitOptions::new(model)
            .with_cache_dir(PathBuf::from(&cfg.cache_dir))
            .with_show_download_progress(false);
        let text_embedding =
            TextEmbedding::try_new(options).map_err(|e| EmbeddingError::Model(e.to_string()))?;
        info!(model = %cfg.model, dimension, cache_dir = %cfg.cache_dir, "local embedding model ready");
        Ok(Self {
            model: Mutex::new(text_embedding),
            name: cfg.model.clone(),
            dimension,
            max_tokens: cfg.max_tokens,
        })
    }

    /// Tokens the model sees for `text`, including special tokens.
    pub fn count_tokens(&self, text: &str) -> Result<usize, EmbeddingError> {
        let model = self.model.lock();
        let encoding = model
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbeddingError::Model(e.to_string()))?;
        Ok(encoding.len())
    }

    fn run(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut batch = self
            .model
            .lock()
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::Model(e.to_string()))?;
        let mut vector = batch
            .pop()
            .ok_or_else(|| EmbeddingError::Model("model returned no embedding".into()))?;
        if vector.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                model: self.name.clone(),
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        l2_normalize(&mut vector);
        Ok(vector)
    }
}

/// Reject configurations the model cannot honour before any download starts.
fn check_config(cfg: &EmbedderConfig) -> Result<(EmbeddingModel, usize), EmbeddingError> {
    let (model, dimension) = known_model(&cfg.model).ok_or_else(|| {
        EmbeddingError::Model(format!(
            "unknown local model {:?}; supported: {}",
            cfg.model,
            MODELS
                .iter()
                .map(|(alias, _, _)| *alias)
                .collect::<Vec<_>>()
                .join(", ")
        ))
    })?;
    if cfg.dimension != dimension {
        return Err(EmbeddingError::DimensionMismatch {
            model: cfg.model.clone(),
            expected: cfg.dimension,
            actual: dimension,
        });
    }
    // The tokenizer truncates at the model limit, so a larger limit could never trip.
    if cfg.max_tokens >= MODEL_MAX_TOKENS {
        return Err(EmbeddingError::Model(format!(
            "max_tokens must be below {MODEL_MAX_TOKENS} for {}",
            cfg.model
        )));
    }
    Ok((model, dimension))
}

impl Embedder for LocalEmbedder {
    fn model_id(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        ensure_not_empty(text)?;
        ensure_within(self.count_tokens(text)?, self.max_tokens)?;
        self.run(text)
    }

    /// fastembed truncates to the model's sequence length itself.
    fn embed_document(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        ensure_not_empty(text)?;
        self.run(text)
    }
}
