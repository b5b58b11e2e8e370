use core_types::config::EmbedderConfig;

use crate::{Embedder, EmbeddingError, l2_normalize, truncate_words, validate_input};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Character trigrams weigh less than whole words.
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Deterministic feature-hashing embedder for tests and offline smoke runs.
///
/// Lowercased word tokens and their character trigrams are hashed into
/// `dimension` signed buckets and the result is L2-normalised, so texts that
/// share vocabulary land close together under L2 distance. Its model id is
/// `feature-hash-<dimension>` and never names a trained model.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    model: String,
    dimension: usize,
    max_tokens: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize, max_tokens: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            model: format!("feature-hash-{dimension}"),
            dimension,
            max_tokens,
        }
    }

    /// Uses the configured dimension and limit; `embedder.model` is ignored.
    pub fn from_config(cfg: &EmbedderConfig) -> Self {
        Self::new(cfg.dimension, cfg.max_tokens)
    }

    fn accumulate(&self, feature: &[u8], weight: f32, out: &mut [f32]) {
        let h = fnv1a(feature);
        let bucket = (h % self.dimension as u64) as usize;
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        out[bucket] += sign * weight;
    }
}

impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        validate_input(text, self.max_tokens)?;

        let mut out = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            self.accumulate(token.as_bytes(), 1.0, &mut out);

            let chars: Vec<char> = token.chars().collect();
            if chars.len() > 3 {
                for window in chars.windows(3) {
                    let gram: String = window.iter().collect();
                    self.accumulate(gram.as_bytes(), TRIGRAM_WEIGHT, &mut out);
                }
            }
        }

        l2_normalize(&mut out);
        Ok(out)
    }

    fn embed_document(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(&truncate_words(text, self.max_tokens))
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |acc, b| {
        (acc ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l2(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
    }

    #[test]
    fn same_text_same_vector() {
        let e = HashEmbedder::new(64, 256);
        assert_eq!(e.embed("Cats chase mice").unwrap(), e.embed("Cats chase mice").unwrap());
    }

    #[test]
    fn output_has_configured_dimension_and_unit_norm() {
        let e = HashEmbedder::new(48, 256);
        let v = e.embed("the quick brown fox").unwrap();
        assert_eq!(v.len(), 48);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn case_and_punctuation_do_not_matter() {
        let e = HashEmbedder::new(64, 256);
        assert_eq!(e.embed("Hello, World!").unwrap(), e.embed("hello world").unwrap());
    }

    #[test]
    fn shared_vocabulary_is_closer() {
        let e = HashEmbedder::new(256, 256);
        let q = e.embed("stock market rally").unwrap();
        let near = e.embed("the stock market posted a rally today").unwrap();
        let far = e.embed("recipe for banana bread").unwrap();
        assert!(l2(&q, &near) < l2(&q, &far));
    }

    #[test]
    fn empty_input_is_an_error() {
        let e = HashEmbedder::new(16, 256);
        assert!(matches!(e.embed("  "), Err(EmbeddingError::EmptyInput)));
    }

    #[test]
    fn model_id_names_the_hashing_scheme_not_a_model() {
        let cfg = EmbedderConfig::default();
        let e = HashEmbedder::from_config(&cfg);
        assert_eq!(e.model_id(), "feature-hash-384");
        assert_ne!(e.model_id(), cfg.model);
        assert_eq!(e.dimension(), 384);
    }

    #[test]
    fn documents_are_truncated_but_queries_rejected() {
        let e = HashEmbedder::new(32, 4);
        let long = "alpha beta gamma delta epsilon zeta";
        assert!(matches!(e.embed(long), Err(EmbeddingError::TooLong { tokens: 6, limit: 4 })));
        assert_eq!(
            e.embed_document(long).unwrap(),
            e.embed("alpha beta gamma delta").unwrap()
        );
    }
}
