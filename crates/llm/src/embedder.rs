//! HTTP embedding client.

use std::time::Duration;

use async_trait::async_trait;
use relia_core::{Embedder, Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Embedding provider configuration.
#[derive(Debug, Clone)]
pub struct HttpEmbedderConfig {
    /// Base URL including any `/v1` suffix
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimensions: usize,
    /// Texts per request
    pub batch_size: usize,
    pub timeout: Duration,
}

impl Default for HttpEmbedderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            batch_size: 100,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: Client,
    config: HttpEmbedderConfig,
}

impl HttpEmbedder {
    pub fn new(config: HttpEmbedderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.config.endpoint.trim_end_matches('/'))
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            model: self.config.model.clone(),
            input: batch.to_vec(),
        };

        let mut builder = self.client.post(self.embeddings_url()).json(&body);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!("API error {status}: {detail}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("invalid response: {e}")))?;

        // Providers may reorder; `index` restores input order.
        let mut ordered: Vec<Vec<f32>> = vec![Vec::new(); batch.len()];
        for item in parsed.data {
            if item.index < ordered.len() {
                ordered[item.index] = item.embedding;
            }
        }
        if ordered.iter().any(|v| v.is_empty()) {
            return Err(Error::Embedding("missing embeddings in response".to_string()));
        }
        Ok(ordered)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut result = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        result
            .pop()
            .ok_or_else(|| Error::Embedding("empty embedding response".to_string()))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            all.extend(self.embed_batch(batch).await?);
        }
        tracing::debug!(count = texts.len(), model = %self.config.model, "texts embedded");
        Ok(all)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}
