//! Shared stub collaborators for core integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use prompt_studio_core::embedding::EmbeddingProvider;
use prompt_studio_core::error::step;
use prompt_studio_core::index::memory::InMemoryPersistence;
use prompt_studio_core::index::{FilterStrategy, VectorIndex};
use prompt_studio_core::models::{
    ChatPrompt, Chunk, ContextQualityAssessment, EvaluationResult, ExpectedOutput, RootCause,
    TemplateAnalysis,
};
use prompt_studio_core::providers::{EvaluationProvider, GenerationProvider, QueryProvider};
use prompt_studio_core::{Result, StudioError};
use serde_json::json;

pub const DIMS: usize = 32;

// ─── Embedding ──────────────────────────────────────────────────────

/// Bag-of-words hashing embedder: identical text gives identical vectors,
/// shared words raise similarity.
pub struct HashEmbedder {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
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

pub fn hash_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        v[(fnv(&word.to_lowercase()) % DIMS as u64) as usize] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-stub"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(StudioError::provider(step::EMBEDDING, "stub outage"));
        }
        Ok(texts.iter().map(|t| hash_vector(t)).collect())
    }
}

pub async fn open_index(
    strategy: FilterStrategy,
) -> (VectorIndex, Arc<HashEmbedder>, Arc<InMemoryPersistence>) {
    let embedder = Arc::new(HashEmbedder::new());
    let persistence = Arc::new(InMemoryPersistence::new());
    let index = VectorIndex::open(embedder.clone(), persistence.clone(), strategy)
        .await
        .unwrap();
    (index, embedder, persistence)
}

pub fn chunk(doc: &str, index: usize, content: &str) -> Chunk {
    Chunk {
        id: format!("{}_chunk_{}", doc, index),
        document_id: doc.to_string(),
        content: content.to_string(),
        chunk_index: index,
        metadata: json!({ "char_count": content.chars().count() }),
    }
}

// ─── Generation ─────────────────────────────────────────────────────

/// Returns a fixed answer and counts calls.
pub struct StubGenerator {
    pub calls: AtomicUsize,
    pub fail_on: Option<usize>,
}

impl StubGenerator {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on: None,
        }
    }
}

#[async_trait]
impl GenerationProvider for StubGenerator {
    async fn generate(&self, _prompt: &ChatPrompt) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on == Some(n) {
            return Err(StudioError::provider(step::GENERATION, "HTTP 500"));
        }
        Ok(format!("generated output {}", n))
    }
}

// ─── Evaluation ─────────────────────────────────────────────────────

/// Plays back `(score, success)` per iteration; past the end, repeats
/// the last entry.
pub struct ScriptedEvaluator {
    pub script: Vec<(f64, bool)>,
    pub evaluated: Mutex<Vec<usize>>,
    pub assessments: AtomicUsize,
}

impl ScriptedEvaluator {
    pub fn new(script: Vec<(f64, bool)>) -> Self {
        Self {
            script,
            evaluated: Mutex::new(Vec::new()),
            assessments: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EvaluationProvider for ScriptedEvaluator {
    async fn evaluate(
        &self,
        generated_output: &str,
        _expected: &ExpectedOutput,
        _contexts: &[String],
        iteration: usize,
    ) -> Result<EvaluationResult> {
        self.evaluated.lock().unwrap().push(iteration);
        let (score, ok) = self
            .script
            .get(iteration - 1)
            .or(self.script.last())
            .copied()
            .unwrap_or((0.0, false));
        Ok(EvaluationResult {
            iteration,
            generated_output: generated_output.to_string(),
            match_score: score,
            root_causes: if ok {
                vec![]
            } else {
                vec![RootCause::ContextMissing]
            },
            improvement_suggestions: vec!["include founding details".into()],
            is_successful: ok,
        })
    }

    async fn assess_context_quality(
        &self,
        _expected: &ExpectedOutput,
        contexts: &[String],
    ) -> Result<ContextQualityAssessment> {
        self.assessments.fetch_add(1, Ordering::SeqCst);
        Ok(ContextQualityAssessment {
            total_chunks: contexts.len(),
            relevant_chunks: contexts.len(),
            relevance_score: 0.5,
            missing_information: vec!["founding date".into()],
            terminology_gaps: vec![],
        })
    }
}

// ─── Queries ────────────────────────────────────────────────────────

/// Numbers each query so iterations can be told apart.
pub struct NumberedQueries {
    pub refinements: AtomicUsize,
    pub seen_samples: Mutex<Vec<String>>,
}

impl NumberedQueries {
    pub fn new() -> Self {
        Self {
            refinements: AtomicUsize::new(0),
            seen_samples: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl QueryProvider for NumberedQueries {
    async fn design_initial_query(
        &self,
        _expected: &ExpectedOutput,
        _analysis: &TemplateAnalysis,
        sample_contexts: &[String],
    ) -> Result<String> {
        self.seen_samples
            .lock()
            .unwrap()
            .extend(sample_contexts.iter().cloned());
        Ok("company founding query 1".to_string())
    }

    async fn refine_query(
        &self,
        _original_query: &str,
        _root_causes: &[RootCause],
        _suggestions: &[String],
        _assessment: &ContextQualityAssessment,
    ) -> Result<String> {
        let n = self.refinements.fetch_add(1, Ordering::SeqCst) + 2;
        Ok(format!("company founding query {}", n))
    }
}
