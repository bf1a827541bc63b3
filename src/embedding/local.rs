use async_trait::async_trait;

use super::{EmbeddingClient, EmbeddingClientError};

/// Deterministic offline embeddings derived from the bytes of each text.
///
/// Useful for tests and air-gapped runs; the vectors carry no semantic meaning.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbeddingClient {
    dimension: usize,
}

impl HashingEmbeddingClient {
    /// Client producing vectors of `dimension` components.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];
        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            embedding[idx % self.dimension] += f32::from(byte) / 255.0;
        }

        let norm = embedding.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }
        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    async fn embed_batch(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        tracing::trace!(count = texts.len(), dimension = self.dimension, "Hashing embeddings");
        Ok(texts.iter().map(|text| self.encode(text)).collect())
    }
}
