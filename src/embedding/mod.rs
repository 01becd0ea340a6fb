//! Embedding backends for the vector index.
//!
//! Every backend implements the core [`EmbeddingProvider`] trait:
//! - **[`DisabledEmbedder`]**: fails every call; the index can still be
//!   opened and listed.
//! - **[`OpenAiEmbedder`]**: `POST {base_url}/embeddings`, batched, with
//!   credentials and model read from the shared [`ProviderCell`].
//! - **[`OllamaEmbedder`]**: `POST {url}/api/embed` on a local Ollama.
//! - **`LocalEmbedder`**: in-process fastembed, behind the
//!   `local-embeddings-fastembed` feature.
//!
//! # Retry Strategy
//!
//! HTTP backends make up to `embedding.max_attempts` attempts per request:
//! - HTTP 429 and 5xx → retry
//! - other 4xx → fail immediately
//! - network errors → retry
//! - backoff before attempt `k` (1-based, k ≥ 2): `min(2^(k-2), 10)` seconds

#[cfg(feature = "local-embeddings-fastembed")]
mod local;

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prompt_studio_core::embedding::EmbeddingProvider;
use prompt_studio_core::error::step;
use prompt_studio_core::{Result, StudioError};
use serde_json::Value;

use crate::config::EmbeddingConfig;
use crate::settings::ProviderCell;

const MAX_BACKOFF_SECS: u64 = 10;

fn embed_err(msg: impl std::fmt::Display) -> StudioError {
    StudioError::provider(step::EMBEDDING, msg)
}

/// Build the embedder named by `embedding.provider`.
pub fn create_embedder(
    config: &EmbeddingConfig,
    cell: Arc<ProviderCell>,
) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder::new(config))),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config, cell)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => Err(StudioError::Configuration(
            "local embedding provider requires --features local-embeddings-fastembed".into(),
        )),
        other => Err(StudioError::Configuration(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ Disabled ============

/// Placeholder used when no embedding backend is configured.
///
/// Reports the configured `dims` (or 0) so a previously built index can
/// still be opened, listed, and cleared.
pub struct DisabledEmbedder {
    dims: usize,
}

impl DisabledEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            dims: config.dims.unwrap_or(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(StudioError::Configuration(
            "embedding provider is disabled; set [embedding] provider in the config file".into(),
        ))
    }
}

// ============ OpenAI ============

/// OpenAI-compatible embeddings endpoint.
pub struct OpenAiEmbedder {
    cell: Arc<ProviderCell>,
    dims: usize,
    batch_size: usize,
    max_attempts: u32,
    client: reqwest::Client,
    /// Model name at construction time, reported by `model_name`.
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig, cell: Arc<ProviderCell>) -> Result<Self> {
        let dims = config.dims.ok_or_else(|| {
            StudioError::Configuration("embedding.dims required for OpenAI provider".into())
        })?;
        let model = cell.snapshot().embedding_model.clone();
        Ok(Self {
            cell,
            dims,
            batch_size: config.batch_size.max(1),
            max_attempts: config.max_attempts.max(1),
            client: http_client(config.timeout_secs)?,
            model,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let settings = self.cell.snapshot();
        let api_key = settings.require_key("embeddings")?;
        let url = format!("{}/embeddings", settings.base_url.trim_end_matches('/'));

        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let body = serde_json::json!({
                "model": settings.embedding_model,
                "input": batch,
            });
            let json = post_with_retry(
                &self.client,
                &url,
                Some(api_key),
                &body,
                self.max_attempts,
                "OpenAI",
            )
            .await?;
            out.extend(parse_openai_response(&json)?);
        }
        Ok(out)
    }
}

/// Extract `data[].embedding`, ordered by `data[].index` when present.
pub fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| embed_err("invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (fallback, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| embed_err("invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(fallback);
        indexed.push((index, to_f32_vec(embedding)));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Local Ollama instance.
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    max_attempts: u32,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            StudioError::Configuration("embedding.model required for Ollama provider".into())
        })?;
        let dims = config.dims.ok_or_else(|| {
            StudioError::Configuration("embedding.dims required for Ollama provider".into())
        })?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            dims,
            url,
            max_attempts: config.max_attempts.max(1),
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let url = format!("{}/api/embed", self.url.trim_end_matches('/'));
        let json =
            post_with_retry(&self.client, &url, None, &body, self.max_attempts, "Ollama").await?;
        parse_ollama_response(&json)
    }
}

pub fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| embed_err("invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|e| {
            e.as_array()
                .map(|a| to_f32_vec(a))
                .ok_or_else(|| embed_err("invalid Ollama response: embedding is not an array"))
        })
        .collect()
}

// ============ Shared HTTP ============

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| StudioError::Configuration(format!("failed to build HTTP client: {}", e)))
}

fn to_f32_vec(values: &[Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

/// Seconds to wait before the given zero-based attempt.
pub fn backoff_secs(attempt: u32) -> u64 {
    if attempt == 0 {
        return 0;
    }
    (1u64 << (attempt - 1).min(6)).min(MAX_BACKOFF_SECS)
}

async fn post_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
    max_attempts: u32,
    label: &str,
) -> Result<Value> {
    let mut last_err = None;

    for attempt in 0..max_attempts {
        if attempt > 0 {
            let delay = backoff_secs(attempt);
            tracing::warn!(attempt = attempt + 1, max_attempts, delay_secs = delay, "retrying {} embedding request", label);
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(key) = bearer {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json::<Value>()
                        .await
                        .map_err(|e| embed_err(format!("invalid {} response: {}", label, e)));
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = embed_err(format!("{} API error {}: {}", label, status, body_text));
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                last_err = Some(embed_err(format!(
                    "{} connection error ({}): {}",
                    label, url, e
                )));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| embed_err(format!("{} embedding failed after retries", label))))
}
