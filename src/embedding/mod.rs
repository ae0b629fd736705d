// src/embedding/mod.rs
// Chunked, rate-governed embedding client.

mod chunker;

pub use chunker::chunk_text;

use crate::config::EmbeddingConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{EmbeddingVector, EMBEDDING_DIM};
use crate::rate_limit::{Provider, RateGovernor};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const MAX_BATCH: usize = 100;

pub struct EmbeddingClient {
    http: Client,
    config: EmbeddingConfig,
    governor: Arc<RateGovernor>,
}

#[derive(Serialize)]
struct EmbeddingRequest {
    input: EmbeddingInput,
    model: String,
}

#[derive(Serialize)]
#[serde(untagged)]
enum EmbeddingInput {
    Single(String),
    Batch(Vec<String>),
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl EmbeddingClient {
    pub fn new(config: EmbeddingConfig, governor: Arc<RateGovernor>) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build embedding http client"),
            config,
            governor,
        }
    }

    fn api_url(&self) -> String {
        format!("{}/embeddings", self.config.base_url.trim_end_matches('/'))
    }

    async fn post(&self, input: EmbeddingInput) -> ServiceResult<Vec<(usize, Vec<f32>)>> {
        self.governor
            .acquire(Provider::Embedding, "embeddings")
            .await
            .map_err(ServiceError::Other)?;

        let request = EmbeddingRequest {
            input,
            model: self.config.model.clone(),
        };

        let response = self
            .http
            .post(self.api_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::UpstreamTimeout {
                        provider: "embedding".to_string(),
                    }
                } else {
                    ServiceError::UpstreamInvalid {
                        provider: "embedding".to_string(),
                        detail: e.to_string(),
                    }
                }
            })?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(20);
            self.governor.notify_retry_after(
                Provider::Embedding,
                "embeddings",
                Duration::from_secs(retry_after),
            );
            return Err(ServiceError::UpstreamThrottled {
                provider: "embedding".to_string(),
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::UpstreamInvalid {
                provider: "embedding".to_string(),
                detail: format!("status {status}: {body}"),
            });
        }

        let result: EmbeddingResponse = response.json().await.map_err(|e| ServiceError::UpstreamInvalid {
            provider: "embedding".to_string(),
            detail: e.to_string(),
        })?;

        for item in &result.data {
            if item.embedding.len() != EMBEDDING_DIM {
                return Err(ServiceError::EmbeddingDimensionMismatch {
                    expected: EMBEDDING_DIM,
                    actual: item.embedding.len(),
                });
            }
        }

        Ok(result.data.into_iter().map(|d| (d.index, d.embedding)).collect())
    }

    pub async fn embed(&self, text: &str) -> ServiceResult<EmbeddingVector> {
        debug!("embedding text ({} chars)", text.len());
        let mut pairs = self.post(EmbeddingInput::Single(text.to_string())).await?;
        pairs
            .pop()
            .map(|(_, v)| v)
            .ok_or_else(|| ServiceError::UpstreamInvalid {
                provider: "embedding".to_string(),
                detail: "empty embedding response".to_string(),
            })
    }

    pub async fn embed_many(&self, texts: &[String]) -> ServiceResult<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH) {
            info!("embedding batch of {} texts", batch.len());
            let mut pairs = self.post(EmbeddingInput::Batch(batch.to_vec())).await?;
            pairs.sort_by_key(|(idx, _)| *idx);
            all.extend(pairs.into_iter().map(|(_, v)| v));
        }
        Ok(all)
    }

    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.config.chunk_overlap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_construction() {
        let client = EmbeddingClient::new(
            EmbeddingConfig {
                api_key: "k".to_string(),
                model: "text-embedding-3-small".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                chunk_size: 8000,
                chunk_overlap: 200,
                batch_size: 64,
            },
            Arc::new(RateGovernor::new(Default::default())),
        );
        assert_eq!(client.api_url(), "https://api.openai.com/v1/embeddings");
    }
}
