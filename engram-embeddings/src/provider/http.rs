//! HTTP client for the remote embedding service.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use engram_core::constants::EMBEDDING_DIM;
use engram_core::errors::{EngramError, EngramResult};

use super::EmbeddingClient;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Client for an embedding service speaking the
/// `POST {base}/api/embeddings` protocol: `{model, prompt}` in,
/// `{embedding}` out. No authentication; base URL and model are
/// caller-configured.
pub struct HttpEmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpEmbeddingClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> EngramResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngramError::embedding(format!("http client build failed: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, prompt: &str) -> EngramResult<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&EmbeddingRequest { model: &self.model, prompt })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngramError::timeout("embedding request")
                } else {
                    EngramError::embedding(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngramError::embedding(format!(
                "embedding service returned {status}"
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EngramError::embedding(format!("malformed response: {e}")))?;

        if body.embedding.len() != EMBEDDING_DIM {
            return Err(EngramError::embedding(format!(
                "embedding has {} components, expected {EMBEDDING_DIM}",
                body.embedding.len()
            )));
        }

        debug!(model = %self.model, chars = prompt.len(), "remote embedding complete");
        Ok(body.embedding)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
