//! TOML configuration.
//!
//! Every section is optional; missing keys fall back to the defaults below.
//! [`load_config`] parses and validates in one step and reports problems
//! as [`StudioError::Configuration`].
//!
//! ```toml
//! [store]
//! path = "./data/studio.sqlite"
//!
//! [uploads]
//! dir = "./data/uploads"
//! max_file_size_mb = 50
//!
//! [chunking]
//! chunk_size = 500
//! chunk_overlap = 50
//!
//! [embedding]
//! provider = "openai"          # disabled | openai | ollama | local
//! model = "text-embedding-ada-002"
//! dims = 1536
//!
//! [llm]
//! provider = "openai"          # disabled | openai
//! base_url = "https://api.openai.com/v1"
//! model = "gpt-4"
//!
//! [optimization]
//! min_iterations = 3
//! max_iterations = 5
//! filter_strategy = "overfetch" # overfetch | exact
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use prompt_studio_core::index::FilterStrategy;
use prompt_studio_core::optimize::OptimizationConfig;
use prompt_studio_core::{Result, StudioError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub optimization: OptimizationSettings,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./data/studio.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadsConfig {
    #[serde(default = "default_upload_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: default_upload_dir(),
            max_file_size_mb: default_max_file_size_mb(),
        }
    }
}

impl UploadsConfig {
    pub fn max_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}
fn default_max_file_size_mb() -> u64 {
    50
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Total attempts per request, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    /// Ollama base URL.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_embedding_timeout(),
            url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    100
}
fn default_max_attempts() -> u32 {
    3
}
fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            base_url: default_base_url(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_model() -> String {
    "gpt-4".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_llm_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OptimizationSettings {
    #[serde(default = "default_min_iterations")]
    pub min_iterations: usize,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: f64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_sample_contexts")]
    pub sample_contexts: usize,
    #[serde(default)]
    pub filter_strategy: FilterStrategy,
    /// Optional wall-clock budget for one optimization run.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            min_iterations: default_min_iterations(),
            max_iterations: default_max_iterations(),
            success_threshold: default_success_threshold(),
            top_k: default_top_k(),
            sample_contexts: default_sample_contexts(),
            filter_strategy: FilterStrategy::default(),
            deadline_secs: None,
        }
    }
}

impl OptimizationSettings {
    pub fn to_core(&self) -> OptimizationConfig {
        OptimizationConfig {
            min_iterations: self.min_iterations,
            max_iterations: self.max_iterations,
            success_threshold: self.success_threshold,
            top_k: self.top_k,
            sample_contexts: self.sample_contexts,
            deadline: self.deadline_secs.map(Duration::from_secs),
        }
    }
}

fn default_min_iterations() -> usize {
    3
}
fn default_max_iterations() -> usize {
    5
}
fn default_success_threshold() -> f64 {
    0.85
}
fn default_top_k() -> usize {
    5
}
fn default_sample_contexts() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn config_err(msg: impl Into<String>) -> StudioError {
    StudioError::Configuration(msg.into())
}

/// Read, parse, and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        config_err(format!(
            "failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)
        .map_err(|e| config_err(format!("failed to parse config file: {}", e)))?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(config_err("chunking.chunk_size must be > 0"));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(config_err(
                "chunking.chunk_overlap must be smaller than chunking.chunk_size",
            ));
        }

        let opt = &self.optimization;
        if opt.min_iterations < 1 || opt.min_iterations > opt.max_iterations {
            return Err(config_err(
                "optimization requires 1 <= min_iterations <= max_iterations",
            ));
        }
        if !(0.0..=1.0).contains(&opt.success_threshold) {
            return Err(config_err(
                "optimization.success_threshold must be in [0.0, 1.0]",
            ));
        }
        if opt.top_k < 1 {
            return Err(config_err("optimization.top_k must be >= 1"));
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" | "local" => {}
            other => {
                return Err(config_err(format!(
                    "unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
                    other
                )))
            }
        }
        if matches!(self.embedding.provider.as_str(), "openai" | "ollama") {
            if self.embedding.dims.unwrap_or(0) == 0 {
                return Err(config_err(format!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                )));
            }
            if self.embedding.model.is_none() {
                return Err(config_err(format!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                )));
            }
        }
        if self.embedding.batch_size == 0 {
            return Err(config_err("embedding.batch_size must be > 0"));
        }

        match self.llm.provider.as_str() {
            "disabled" | "openai" => {}
            other => {
                return Err(config_err(format!(
                    "unknown llm provider: '{}'. Must be disabled or openai.",
                    other
                )))
            }
        }

        Ok(())
    }
}
