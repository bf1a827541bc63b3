//! Embedding providers and the batching wrapper used during ingest.

mod local;
mod ollama;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{Config, EmbeddingProvider};

pub use local::HashingEmbeddingClient;
pub use ollama::OllamaEmbeddingClient;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider could not be reached or is misconfigured.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// Provider returned a different number of vectors than inputs.
    #[error("Expected {expected} embeddings, received {actual}")]
    CountMismatch {
        /// Number of inputs sent.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },
    /// A vector did not have the index dimension.
    #[error("Embedding dimension mismatch: expected {expected}, received {actual}")]
    DimensionMismatch {
        /// Dimension asserted by the index schema.
        expected: usize,
        /// Length of the offending vector.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce one embedding vector per input text, in input order.
    async fn embed_batch(&self, texts: Vec<String>)
    -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Embed `texts` in provider calls of at most `batch_size` inputs.
///
/// Every batch must return exactly one vector per input, each of length `dimension`; anything
/// else fails the whole call so no partial result reaches the index.
pub async fn embed_in_batches(
    client: &dyn EmbeddingClient,
    texts: Vec<String>,
    batch_size: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
    let batch_size = batch_size.max(1);
    let mut vectors = Vec::with_capacity(texts.len());
    let mut pending = texts.into_iter().peekable();

    while pending.peek().is_some() {
        let batch: Vec<String> = pending.by_ref().take(batch_size).collect();
        let expected = batch.len();
        let embedded = client.embed_batch(batch).await?;
        if embedded.len() != expected {
            return Err(EmbeddingClientError::CountMismatch {
                expected,
                actual: embedded.len(),
            });
        }
        if let Some(bad) = embedded.iter().find(|vector| vector.len() != dimension) {
            return Err(EmbeddingClientError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }
        vectors.extend(embedded);
    }

    Ok(vectors)
}

/// Build the embedding client selected by configuration.
pub fn build_embedding_client(
    config: &Config,
) -> Result<Box<dyn EmbeddingClient>, EmbeddingClientError> {
    match config.embedding_provider {
        EmbeddingProvider::Hash => Ok(Box::new(HashingEmbeddingClient::new(
            config.embedding_dimension,
        ))),
        EmbeddingProvider::Ollama => {
            let base_url = config
                .ollama_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
            let client = OllamaEmbeddingClient::new(base_url, config.embedding_model.clone())?;
            Ok(Box::new(client))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records batch sizes and returns vectors of a fixed length.
    struct Recording {
        dimension: usize,
        drop_last: bool,
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl EmbeddingClient for Recording {
        async fn embed_batch(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            self.calls.lock().expect("lock").push(texts.len());
            let mut vectors: Vec<Vec<f32>> =
                texts.iter().map(|_| vec![0.5; self.dimension]).collect();
            if self.drop_last {
                vectors.pop();
            }
            Ok(vectors)
        }
    }

    fn recording(dimension: usize, drop_last: bool) -> Recording {
        Recording {
            dimension,
            drop_last,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn texts(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("segment {i}")).collect()
    }

    #[tokio::test]
    async fn splits_input_into_bounded_batches() {
        let client = recording(4, false);
        let vectors = embed_in_batches(&client, texts(5), 2, 4)
            .await
            .expect("embed");
        assert_eq!(vectors.len(), 5);
        assert_eq!(*client.calls.lock().expect("lock"), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn count_mismatch_fails() {
        let client = recording(4, true);
        let error = embed_in_batches(&client, texts(3), 10, 4)
            .await
            .expect_err("mismatch");
        assert!(matches!(
            error,
            EmbeddingClientError::CountMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn dimension_mismatch_fails() {
        let client = recording(3, false);
        let error = embed_in_batches(&client, texts(1), 10, 4)
            .await
            .expect_err("mismatch");
        assert!(matches!(
            error,
            EmbeddingClientError::DimensionMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let client = recording(4, false);
        let vectors = embed_in_batches(&client, Vec::new(), 8, 4)
            .await
            .expect("embed");
        assert!(vectors.is_empty());
        assert!(client.calls.lock().expect("lock").is_empty());
    }
}
