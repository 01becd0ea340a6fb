//! Runtime-adjustable model settings.
//!
//! The OpenAI-compatible clients read their credentials, base URL, and
//! model names from a shared [`ProviderCell`] on every call. Updates
//! swap in a whole new [`LlmSettings`] value, so a request in flight
//! keeps the snapshot it started with and never sees a half-applied
//! update.
//!
//! The API key is taken from `OPENAI_API_KEY` at startup and is never
//! written back to disk or returned by the API.

use std::sync::{Arc, RwLock};

use prompt_studio_core::prompt::GenerationParams;
use prompt_studio_core::{Result, StudioError};
use serde::{Deserialize, Serialize};

use crate::config::Config;

#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmSettings {
    /// Settings from config, with the key from `OPENAI_API_KEY` and an
    /// optional `OPENAI_BASE_URL` override.
    pub fn from_config(config: &Config) -> Self {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        let base_url = std::env::var("OPENAI_BASE_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| config.llm.base_url.clone());

        Self {
            api_key,
            base_url,
            model: config.llm.model.clone(),
            embedding_model: config
                .embedding
                .model
                .clone()
                .unwrap_or_else(|| "text-embedding-ada-002".to_string()),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// The key, or a configuration error naming the step that needed it.
    pub fn require_key(&self, purpose: &str) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            StudioError::Configuration(format!(
                "OPENAI_API_KEY is not set; it is required for {}",
                purpose
            ))
        })
    }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    pub fn view(&self) -> LlmSettingsView {
        LlmSettingsView {
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            embedding_model: self.embedding_model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            is_configured: self.is_configured(),
        }
    }
}

/// Public view of the settings; never includes the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettingsView {
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub is_configured: bool,
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmUpdate {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Shared, atomically swappable [`LlmSettings`].
pub struct ProviderCell {
    current: RwLock<Arc<LlmSettings>>,
}

impl ProviderCell {
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            current: RwLock::new(Arc::new(settings)),
        }
    }

    /// The settings in effect right now.
    pub fn snapshot(&self) -> Arc<LlmSettings> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Apply a partial update and return the new settings.
    pub fn update(&self, update: LlmUpdate) -> Result<Arc<LlmSettings>> {
        if let Some(t) = update.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(StudioError::Validation(format!(
                    "temperature must be within [0, 2], got {}",
                    t
                )));
            }
        }
        if update.max_tokens == Some(0) {
            return Err(StudioError::Validation("max_tokens must be > 0".into()));
        }
        if update.base_url.as_deref().is_some_and(|u| u.trim().is_empty()) {
            return Err(StudioError::Validation("base_url must not be empty".into()));
        }

        let mut guard = self
            .current
            .write()
            .map_err(|_| StudioError::Configuration("settings lock poisoned".into()))?;
        let mut next = LlmSettings::clone(&guard);
        if let Some(key) = update.api_key {
            next.api_key = Some(key).filter(|k| !k.trim().is_empty());
        }
        if let Some(url) = update.base_url {
            next.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = update.model {
            next.model = model;
        }
        if let Some(model) = update.embedding_model {
            next.embedding_model = model;
        }
        if let Some(t) = update.temperature {
            next.temperature = t;
        }
        if let Some(m) = update.max_tokens {
            next.max_tokens = m;
        }

        let next = Arc::new(next);
        *guard = Arc::clone(&next);
        tracing::info!(model = %next.model, base_url = %next.base_url, "llm settings updated");
        Ok(next)
    }
}
