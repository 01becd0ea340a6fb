//! Collaborator traits consumed by the optimization loop.
//!
//! The loop never talks to a model or a store directly. It calls these
//! traits, and the application supplies implementations backed by HTTP
//! model APIs and the shared vector index. Tests supply scripted stubs.
//!
//! Failures surface as [`StudioError::Provider`](crate::StudioError::Provider)
//! carrying the step name from [`crate::error::step`]. None of these calls
//! are retried by the loop.

use async_trait::async_trait;

use crate::error::Result;
use crate::index::VectorIndex;
use crate::models::{
    ChatPrompt, ContextQualityAssessment, EvaluationResult, ExpectedOutput, RetrievedContext,
    RootCause, TemplateAnalysis,
};

/// Produces the model's answer for an assembled prompt.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, prompt: &ChatPrompt) -> Result<String>;
}

/// Scores generated output and judges retrieved context.
#[async_trait]
pub trait EvaluationProvider: Send + Sync {
    /// Compare `generated_output` with the expected output.
    ///
    /// The returned score is in `[0, 1]` and `iteration` is echoed back.
    async fn evaluate(
        &self,
        generated_output: &str,
        expected: &ExpectedOutput,
        contexts: &[String],
        iteration: usize,
    ) -> Result<EvaluationResult>;

    /// Report what the retrieved context is missing for this template.
    async fn assess_context_quality(
        &self,
        expected: &ExpectedOutput,
        contexts: &[String],
    ) -> Result<ContextQualityAssessment>;
}

/// Writes and rewrites retrieval queries.
///
/// Implementations keep queries free of document-specific structure
/// (chapter, section, or page references) so they transfer across
/// documents.
#[async_trait]
pub trait QueryProvider: Send + Sync {
    async fn design_initial_query(
        &self,
        expected: &ExpectedOutput,
        analysis: &TemplateAnalysis,
        sample_contexts: &[String],
    ) -> Result<String>;

    async fn refine_query(
        &self,
        original_query: &str,
        root_causes: &[RootCause],
        suggestions: &[String],
        assessment: &ContextQualityAssessment,
    ) -> Result<String>;
}

/// Read access to ranked chunks.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<RetrievedContext>>;
}

#[async_trait]
impl ContextRetriever for VectorIndex {
    async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        document_ids: Option<&[String]>,
    ) -> Result<Vec<RetrievedContext>> {
        self.search(query, top_k, document_ids).await
    }
}
