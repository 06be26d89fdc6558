//! Text embedding capability.
//!
//! An [`EmbeddingModel`] turns texts into fixed-length vectors. Builtin
//! implementations live in [`crate::providers::embeddings`].

pub mod embedding;

use async_trait::async_trait;
use thiserror::Error;

/// Every variant means the embedding backend could not produce a usable batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EmbedderError {
    #[error("Embedding request failed: {0}")]
    RequestError(String),
    #[error("Failed to parse embedding response: {0}")]
    ParseError(String),
    #[error("Embedding provider returned {status}: {message}")]
    ProviderError { status: u16, message: String },
    #[error("Embedding request timed out")]
    Timeout,
    #[error("Expected {expected} embeddings, got {got}")]
    CountMismatch { expected: usize, got: usize },
    #[error("Expected embeddings of dimension {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Maps text to vectors.
///
/// All vectors returned by one instance share the same length, and encoding the
/// same text twice yields the same vector. A batch either fully succeeds or fails.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Encodes a batch of texts, one vector per text, in input order.
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbedderError>;

    /// Encodes a single query text.
    async fn encode_query(&self, text: &str) -> Result<Vec<f64>, EmbedderError> {
        self.encode(&[text.to_string()])
            .await?
            .pop()
            .ok_or(EmbedderError::CountMismatch {
                expected: 1,
                got: 0,
            })
    }
}

/// Checks that a provider returned one vector per input and a single dimension.
pub(crate) fn validate_batch(
    expected: usize,
    vectors: &[Vec<f64>],
) -> Result<(), EmbedderError> {
    if vectors.len() != expected {
        return Err(EmbedderError::CountMismatch {
            expected,
            got: vectors.len(),
        });
    }
    if let Some(first) = vectors.first() {
        if let Some(bad) = vectors.iter().find(|v| v.len() != first.len()) {
            return Err(EmbedderError::DimensionMismatch {
                expected: first.len(),
                got: bad.len(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<Vec<f64>>);

    #[async_trait]
    impl EmbeddingModel for Fixed {
        async fn encode(&self, _texts: &[String]) -> Result<Vec<Vec<f64>>, EmbedderError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_validate_batch() {
        assert!(validate_batch(2, &[vec![1.0, 0.0], vec![0.0, 1.0]]).is_ok());
        assert!(validate_batch(0, &[]).is_ok());
        assert_eq!(
            validate_batch(3, &[vec![1.0]]),
            Err(EmbedderError::CountMismatch {
                expected: 3,
                got: 1
            })
        );
        assert_eq!(
            validate_batch(2, &[vec![1.0, 0.0], vec![1.0]]),
            Err(EmbedderError::DimensionMismatch {
                expected: 2,
                got: 1
            })
        );
    }

    #[tokio::test]
    async fn test_encode_query_requires_a_vector() {
        let model = Fixed(vec![]);
        assert_eq!(
            model.encode_query("hi").await,
            Err(EmbedderError::CountMismatch {
                expected: 1,
                got: 0
            })
        );
        let model = Fixed(vec![vec![0.5, 0.5]]);
        assert_eq!(model.encode_query("hi").await.unwrap(), vec![0.5, 0.5]);
    }
}
