//! In-process embeddings via fastembed.
//!
//! The model is downloaded on first use and cached by fastembed; after
//! that no network access is needed. Inference runs on the blocking pool.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use prompt_studio_core::embedding::EmbeddingProvider;
use prompt_studio_core::error::step;
use prompt_studio_core::{Result, StudioError};

use crate::config::EmbeddingConfig;

const DEFAULT_MODEL: &str = "all-minilm-l6-v2";

pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: fastembed::EmbeddingModel,
    loaded: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
}

impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let model = to_fastembed_model(&model_name)?;
        let dims = config.dims.unwrap_or_else(|| default_dims(&model_name));

        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size.max(1),
            model,
            loaded: Arc::new(Mutex::new(None)),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let texts = texts.to_vec();
        let loaded = Arc::clone(&self.loaded);
        let model = self.model.clone();
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut guard = loaded
                .lock()
                .map_err(|_| StudioError::provider(step::EMBEDDING, "local model lock poisoned"))?;
            if guard.is_none() {
                tracing::info!(?model, "loading local embedding model");
                let instance = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(model).with_show_download_progress(false),
                )
                .map_err(|e| {
                    StudioError::provider(
                        step::EMBEDDING,
                        format!("failed to initialize local embedding model: {}", e),
                    )
                })?;
                *guard = Some(instance);
            }
            let Some(embedder) = guard.as_mut() else {
                return Err(StudioError::provider(step::EMBEDDING, "local model unavailable"));
            };
            embedder
                .embed(texts, Some(batch_size))
                .map_err(|e| StudioError::provider(step::EMBEDDING, format!("local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| StudioError::provider(step::EMBEDDING, e))?
    }
}

fn default_dims(model_name: &str) -> usize {
    match model_name {
        "bge-base-en-v1.5" | "nomic-embed-text-v1" | "nomic-embed-text-v1.5"
        | "multilingual-e5-base" => 768,
        "bge-large-en-v1.5" | "multilingual-e5-large" => 1024,
        _ => 384,
    }
}

fn to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    use fastembed::EmbeddingModel as M;
    match name {
        "all-minilm-l6-v2" => Ok(M::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(M::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(M::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(M::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(M::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(M::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(M::MultilingualE5Small),
        "multilingual-e5-base" => Ok(M::MultilingualE5Base),
        "multilingual-e5-large" => Ok(M::MultilingualE5Large),
        other => Err(StudioError::Configuration(format!(
            "unknown local embedding model: '{}'",
            other
        ))),
    }
}
