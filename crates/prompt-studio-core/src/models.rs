//! Core data models used throughout Prompt Studio.
//!
//! These types represent the documents and chunks that flow through
//! ingestion, the expected-output definition supplied by the user, and the
//! records produced by each round of the optimization loop. All of them
//! serialize with serde so the HTTP API and the CLI can emit them directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, StudioError};

// ============ Documents ============

/// Document formats accepted at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentType {
    #[serde(rename = "pdf")]
    Pdf,
    #[serde(rename = "docx")]
    Docx,
    #[serde(rename = "txt")]
    Txt,
    #[serde(rename = "md")]
    Markdown,
}

/// File extensions accepted at ingestion, lowercase, without the dot.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "docx", "doc", "txt", "md", "markdown"];

impl DocumentType {
    /// Map a file extension (case-insensitive, no dot) to a document type.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentType::Pdf),
            "docx" | "doc" => Some(DocumentType::Docx),
            "txt" => Some(DocumentType::Txt),
            "md" | "markdown" => Some(DocumentType::Markdown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Pdf => "pdf",
            DocumentType::Docx => "docx",
            DocumentType::Txt => "txt",
            DocumentType::Markdown => "md",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document registered in the studio.
///
/// Immutable after ingestion except for `chunk_count` and `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub document_type: DocumentType,
    /// Where the uploaded bytes are stored.
    pub file_path: String,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// A retrieval unit cut from a document's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `"{document_id}_chunk_{chunk_index}"`.
    pub id: String,
    pub document_id: String,
    pub content: String,
    /// Zero-based position within the document.
    pub chunk_index: usize,
    /// Always carries `char_count`.
    pub metadata: serde_json::Value,
}

/// A chunk returned from similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub chunk_id: String,
    pub document_id: String,
    pub content: String,
    /// Cosine similarity between query and chunk.
    pub score: f32,
    pub metadata: serde_json::Value,
}

// ============ Expected output & template analysis ============

/// Structural shape of an expected output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureType {
    #[default]
    Text,
    Json,
    Table,
    List,
}

impl StructureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StructureType::Text => "text",
            StructureType::Json => "json",
            StructureType::Table => "table",
            StructureType::List => "list",
        }
    }
}

impl fmt::Display for StructureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StructureType {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(StructureType::Text),
            "json" => Ok(StructureType::Json),
            "table" => Ok(StructureType::Table),
            "list" => Ok(StructureType::List),
            other => Err(StudioError::Validation(format!(
                "unsupported output format '{}': use text, json, table, or list",
                other
            ))),
        }
    }
}

/// The user's description of what the generated output should look like.
///
/// The template uses `{placeholder}` tokens that name the *kind* of
/// information wanted, not actual values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExpectedOutput {
    pub template: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Free-text response style guidance ("be concise", "use bullets", ...).
    #[serde(default)]
    pub output_instructions: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub examples: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub output_format: StructureType,
}

/// Treat an explicit `null` like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ExpectedOutput {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            ..Default::default()
        }
    }

    /// Reject templates that cannot drive an optimization run.
    pub fn validate(&self) -> Result<()> {
        if self.template.trim().is_empty() {
            return Err(StudioError::Validation(
                "expected output template must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Semantic type inferred from a placeholder's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderType {
    Date,
    List,
    Number,
    Text,
    String,
}

impl PlaceholderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaceholderType::Date => "date",
            PlaceholderType::List => "list",
            PlaceholderType::Number => "number",
            PlaceholderType::Text => "text",
            PlaceholderType::String => "string",
        }
    }
}

impl fmt::Display for PlaceholderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatePlaceholder {
    pub name: String,
    #[serde(rename = "type")]
    pub detected_type: PlaceholderType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateAnalysis {
    /// In order of first appearance; duplicates kept.
    pub placeholders: Vec<TemplatePlaceholder>,
    pub structure_type: StructureType,
    pub information_requirements: Vec<String>,
    pub suggested_queries: Vec<String>,
}

// ============ Evaluation ============

/// Why a generated output failed to match expectations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootCause {
    ContextMissing,
    TerminologyMismatch,
    StructureMismatch,
    Ambiguity,
    RetrievalQuality,
}

impl RootCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            RootCause::ContextMissing => "context_missing",
            RootCause::TerminologyMismatch => "terminology_mismatch",
            RootCause::StructureMismatch => "structure_mismatch",
            RootCause::Ambiguity => "ambiguity",
            RootCause::RetrievalQuality => "retrieval_quality",
        }
    }
}

impl fmt::Display for RootCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RootCause {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "context_missing" => Ok(RootCause::ContextMissing),
            "terminology_mismatch" => Ok(RootCause::TerminologyMismatch),
            "structure_mismatch" => Ok(RootCause::StructureMismatch),
            "ambiguity" => Ok(RootCause::Ambiguity),
            "retrieval_quality" => Ok(RootCause::RetrievalQuality),
            other => Err(StudioError::Validation(format!(
                "unknown root cause: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub iteration: usize,
    pub generated_output: String,
    /// In `[0.0, 1.0]`.
    pub match_score: f64,
    #[serde(default)]
    pub root_causes: Vec<RootCause>,
    #[serde(default)]
    pub improvement_suggestions: Vec<String>,
    #[serde(default)]
    pub is_successful: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContextQualityAssessment {
    #[serde(default)]
    pub total_chunks: usize,
    #[serde(default)]
    pub relevant_chunks: usize,
    #[serde(default)]
    pub relevance_score: f64,
    #[serde(default)]
    pub missing_information: Vec<String>,
    #[serde(default)]
    pub terminology_gaps: Vec<String>,
}

// ============ Prompts ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A structured instruction + context prompt, ready for a chat model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPrompt {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

// ============ Optimization ============

/// One round of the optimization loop. Never modified after it is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationIteration {
    pub iteration: usize,
    pub query: String,
    pub retrieved_contexts: Vec<String>,
    pub generated_prompt: ChatPrompt,
    pub evaluation: EvaluationResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStatus {
    Success,
    Completed,
    NeedsImprovement,
}

impl OptimizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationStatus::Success => "success",
            OptimizationStatus::Completed => "completed",
            OptimizationStatus::NeedsImprovement => "needs_improvement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// The best-scoring prompt seen, not necessarily the last one.
    pub final_prompt: ChatPrompt,
    pub iterations: Vec<OptimizationIteration>,
    pub total_iterations: usize,
    /// Maximum match score across `iterations`.
    pub final_match_score: f64,
    /// Iteration that produced `final_prompt`.
    pub best_iteration: usize,
    pub status: OptimizationStatus,
    pub message: String,
}
