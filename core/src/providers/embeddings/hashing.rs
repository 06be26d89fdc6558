use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::embeddings::{EmbedderError, EmbeddingModel};

pub const DEFAULT_HASHING_DIMENSIONS: usize = 384;

/// Local, deterministic bag-of-words embedding.
///
/// Every lowercase alphanumeric token is hashed into one of `dimensions`
/// buckets with a hash-derived sign, and the resulting vector is L2
/// normalised. Texts sharing words end up close under cosine similarity.
///
/// Tokens are hashed with SHA-256 (first eight bytes, big-endian), so the same
/// text produces the bit-identical vector across runs, platforms and compiler
/// releases, and persisted collections stay queryable after an upgrade.
#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    dimensions: usize,
}

impl Default for HashingEmbedding {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSIONS)
    }
}

impl HashingEmbedding {
    /// Zero dimensions are bumped to one.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Vec<f64> {
        let mut vector = vec![0.0; self.dimensions];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);
        for token in tokens {
            let hash = token_hash(&token);
            #[allow(clippy::cast_possible_truncation)]
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

fn token_hash(token: &str) -> u64 {
    let digest = Sha256::digest(token.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

#[async_trait]
impl EmbeddingModel for HashingEmbedding {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbedderError> {
        debug!(batch_size = texts.len(), "hashing embedding batch");
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::cosine_similarity;

    #[tokio::test]
    async fn test_embedding_is_deterministic_and_fixed_length() {
        let model = HashingEmbedding::new(64);
        let texts = vec!["Food: Apple. Calories: 95.".to_string(), "bot: hi".to_string()];
        let first = model.encode(&texts).await.unwrap();
        let second = model.encode(&texts).await.unwrap();
        assert_eq!(first, second);
        assert!(first.iter().all(|v| v.len() == 64));
        assert_eq!(model.encode_query(&texts[0]).await.unwrap(), first[0]);
    }

    #[tokio::test]
    async fn test_token_buckets_are_stable() {
        let model = HashingEmbedding::new(8);
        let vector = model.encode_query("Apple, protein & BANANA").await.unwrap();
        let s = 1.0 / 3f64.sqrt();
        assert_eq!(vector, vec![0.0, s, 0.0, 0.0, 0.0, -s, -s, 0.0]);
    }

    #[tokio::test]
    async fn test_shared_words_are_closer() {
        let model = HashingEmbedding::default();
        let query = model.encode_query("high protein").await.unwrap();
        let related = model.encode_query("Protein: 31g, high in protein").await.unwrap();
        let unrelated = model.encode_query("weather tomorrow looks sunny").await.unwrap();
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_text_without_tokens_is_zero_vector() {
        let model = HashingEmbedding::new(0);
        assert_eq!(model.dimensions(), 1);
        assert_eq!(model.encode_query("  ...  ").await.unwrap(), vec![0.0]);
    }
}
