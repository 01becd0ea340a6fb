//! Stub providers and a temp-dir studio for application tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use prompt_studio::config::{parse_config, Config};
use prompt_studio::settings::{LlmSettings, ProviderCell};
use prompt_studio::studio::{Providers, Studio};
use prompt_studio_core::embedding::EmbeddingProvider;
use prompt_studio_core::error::step;
use prompt_studio_core::models::{
    ChatPrompt, ChatRole, ContextQualityAssessment, EvaluationResult, ExpectedOutput, RootCause,
    TemplateAnalysis,
};
use prompt_studio_core::providers::{EvaluationProvider, GenerationProvider, QueryProvider};
use prompt_studio_core::{Result, StudioError};
use tempfile::TempDir;

pub const DIMS: usize = 64;

// ─── Embedding ──────────────────────────────────────────────────────

/// Hashed bag of words: shared words raise cosine similarity.
pub struct WordHashEmbedder {
    pub fail: AtomicBool,
}

impl WordHashEmbedder {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
        }
    }
}

fn fnv(word: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in word.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

#[async_trait]
impl EmbeddingProvider for WordHashEmbedder {
    fn model_name(&self) -> &str {
        "word-hash"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StudioError::provider(step::EMBEDDING, "HTTP 503"));
        }
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; DIMS];
                for word in text
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                {
                    v[(fnv(&word.to_lowercase()) % DIMS as u64) as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

// ─── Generation / evaluation / queries ──────────────────────────────

/// Echoes the user message length so outputs differ between iterations.
pub struct EchoGenerator {
    pub calls: AtomicUsize,
}

#[async_trait]
impl GenerationProvider for EchoGenerator {
    async fn generate(&self, prompt: &ChatPrompt) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let user = prompt
            .messages
            .iter()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.len())
            .unwrap_or(0);
        Ok(format!("answer built from {} prompt bytes", user))
    }
}

/// Scores iteration `n` as `scores[n - 1]`; successful at or above 0.85.
pub struct StepEvaluator {
    pub scores: Vec<f64>,
}

#[async_trait]
impl EvaluationProvider for StepEvaluator {
    async fn evaluate(
        &self,
        generated_output: &str,
        _expected: &ExpectedOutput,
        _contexts: &[String],
        iteration: usize,
    ) -> Result<EvaluationResult> {
        let score = self
            .scores
            .get(iteration - 1)
            .or(self.scores.last())
            .copied()
            .unwrap_or(0.0);
        let ok = score >= 0.85;
        Ok(EvaluationResult {
            iteration,
            generated_output: generated_output.to_string(),
            match_score: score,
            root_causes: if ok {
                vec![]
            } else {
                vec![RootCause::ContextMissing]
            },
            improvement_suggestions: vec!["ask for the founding year".into()],
            is_successful: ok,
        })
    }

    async fn assess_context_quality(
        &self,
        _expected: &ExpectedOutput,
        contexts: &[String],
    ) -> Result<ContextQualityAssessment> {
        Ok(ContextQualityAssessment {
            total_chunks: contexts.len(),
            relevant_chunks: contexts.len() / 2,
            relevance_score: 0.5,
            missing_information: vec!["founding year".into()],
            terminology_gaps: vec![],
        })
    }
}

pub struct FixedQueries;

#[async_trait]
impl QueryProvider for FixedQueries {
    async fn design_initial_query(
        &self,
        _expected: &ExpectedOutput,
        _analysis: &TemplateAnalysis,
        _sample_contexts: &[String],
    ) -> Result<String> {
        Ok("company founded headquarters".to_string())
    }

    async fn refine_query(
        &self,
        original_query: &str,
        _root_causes: &[RootCause],
        _suggestions: &[String],
        _assessment: &ContextQualityAssessment,
    ) -> Result<String> {
        Ok(format!("{} year", original_query))
    }
}

// ─── Studio setup ───────────────────────────────────────────────────

pub fn test_config(root: &Path, extra: &str) -> Config {
    let content = format!(
        r#"[store]
path = "{root}/data/studio.sqlite"

[uploads]
dir = "{root}/data/uploads"

[chunking]
chunk_size = 120
chunk_overlap = 20

[optimization]
min_iterations = 2
max_iterations = 4
top_k = 3
{extra}
"#,
        root = root.display(),
        extra = extra
    );
    parse_config(&content).unwrap()
}

pub fn stub_providers(embedder: Arc<WordHashEmbedder>, scores: Vec<f64>) -> Providers {
    Providers {
        embedder,
        generator: Arc::new(EchoGenerator {
            calls: AtomicUsize::new(0),
        }),
        evaluator: Arc::new(StepEvaluator { scores }),
        queries: Arc::new(FixedQueries),
    }
}

pub async fn open_with(config: Config, embedder: Arc<WordHashEmbedder>) -> Studio {
    let cell = Arc::new(ProviderCell::new(LlmSettings::from_config(&config)));
    Studio::with_providers(config, stub_providers(embedder, vec![0.5, 0.9, 0.95]), cell)
        .await
        .unwrap()
}

/// A studio over a fresh temp dir.
pub async fn open_studio() -> (TempDir, Studio, Arc<WordHashEmbedder>) {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(WordHashEmbedder::new());
    let studio = open_with(test_config(tmp.path(), ""), embedder.clone()).await;
    (tmp, studio, embedder)
}

pub const ACME: &str = "Acme Corporation was founded in 1999 by Jane Smith. \
The company headquarters is located in Oslo, Norway. \
Acme builds industrial robots for warehouses and ports.";

pub const GARDEN: &str = "# Garden notes\n\n\
Tomatoes need full sun and regular watering. \
Basil grows well next to tomatoes and keeps pests away.";

pub fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
