use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error};

use crate::embeddings::{validate_batch, EmbedderError, EmbeddingModel};

pub const DEFAULT_OPENAI_EMBEDDING_URL: &str = "https://api.openai.com/v1/embeddings";
pub const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Embeddings from an OpenAI-compatible `/v1/embeddings` endpoint.
///
/// A whole batch is sent as one request. The request timeout is enforced by the
/// HTTP client and reported as [`EmbedderError::Timeout`].
pub struct OpenAIEmbedding {
    api_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    client: Client,
}

impl OpenAIEmbedding {
    pub fn new(api_key: String, api_url: String, model: String) -> Self {
        Self {
            api_url,
            api_key,
            model,
            timeout: DEFAULT_TIMEOUT,
            client: Client::new(),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f64>,
    #[serde(default)]
    index: usize,
}

#[async_trait]
impl EmbeddingModel for OpenAIEmbedding {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        debug!(batch_size = texts.len(), model = %self.model, "requesting embeddings");
        let request_body = json!({
            "input": texts,
            "model": self.model,
        });
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "embedding request failed");
                if e.is_timeout() {
                    EmbedderError::Timeout
                } else {
                    EmbedderError::RequestError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = status.as_u16(), body = %message, "embedding provider error");
            return Err(EmbedderError::ProviderError {
                status: status.as_u16(),
                message,
            });
        }

        let mut response = response
            .json::<OpenAIEmbeddingResponse>()
            .await
            .map_err(|e| EmbedderError::ParseError(e.to_string()))?;
        response.data.sort_by_key(|d| d.index);
        let vectors: Vec<Vec<f64>> = response.data.into_iter().map(|d| d.embedding).collect();
        validate_batch(texts.len(), &vectors)?;
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(url: &str) -> OpenAIEmbedding {
        OpenAIEmbedding::new(
            "test-key".to_string(),
            format!("{url}/v1/embeddings"),
            DEFAULT_OPENAI_EMBEDDING_MODEL.to_string(),
        )
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text {i}")).collect()
    }

    #[tokio::test]
    async fn test_batch_is_reordered_by_index() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/embeddings")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_body(
                r#"{"data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]}"#,
            )
            .create_async()
            .await;

        let vectors = model(&server.url()).encode(&texts(2)).await.unwrap();
        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_provider_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/embeddings")
            .with_status(500)
            .with_body("overloaded")
            .create_async()
            .await;

        let result = model(&server.url()).encode(&texts(1)).await;
        assert_eq!(
            result,
            Err(EmbedderError::ProviderError {
                status: 500,
                message: "overloaded".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_malformed_body_and_count_mismatch() {
        let mut server = mockito::Server::new_async().await;
        let _bad = server
            .mock("POST", "/v1/embeddings")
            .with_status(200)
            .with_body("{\"data\": 3}")
            .create_async()
            .await;
        let result = model(&server.url()).encode(&texts(1)).await;
        assert!(matches!(result, Err(EmbedderError::ParseError(_))));

        let mut server = mockito::Server::new_async().await;
        let _short = server
            .mock("POST", "/v1/embeddings")
            .with_status(200)
            .with_body(r#"{"data": [{"index": 0, "embedding": [1.0]}]}"#)
            .create_async()
            .await;
        let result = model(&server.url()).encode(&texts(2)).await;
        assert_eq!(
            result,
            Err(EmbedderError::CountMismatch {
                expected: 2,
                got: 1
            })
        );
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_request() {
        let model = model("http://127.0.0.1:9");
        assert_eq!(model.encode(&[]).await.unwrap(), Vec::<Vec<f64>>::new());
    }

    #[tokio::test]
    #[ignore]
    async fn simple_openai_embed_request() {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap();
        let model = OpenAIEmbedding::new(
            api_key,
            DEFAULT_OPENAI_EMBEDDING_URL.to_string(),
            DEFAULT_OPENAI_EMBEDDING_MODEL.to_string(),
        );
        let response = model.encode_query("test").await;
        assert!(response.is_ok());
    }
}
