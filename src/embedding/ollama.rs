//! Ollama `/api/embed` adapter.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{EmbeddingClient, EmbeddingClientError};

/// Embeddings served by a local Ollama runtime.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingClient {
    /// Client for `model` on the runtime at `base_url`.
    pub fn new(base_url: String, model: String) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder()
            .user_agent("rustyindex/embed")
            .build()
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to build HTTP client: {error}"
                ))
            })?;
        Ok(Self {
            http,
            base_url,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn embed_batch(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(model = %self.model, count = texts.len(), "Requesting embeddings");

        let payload = json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(EmbeddingClientError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: EmbedResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;
        Ok(body.embeddings)
    }
}
