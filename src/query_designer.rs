//! Retrieval query design and refinement via the chat model.
//!
//! Both prompts forbid document-structure references (chapters, sections,
//! pages) so that a query found for one document keeps working on others.

use std::sync::Arc;

use async_trait::async_trait;
use prompt_studio_core::error::step;
use prompt_studio_core::models::{
    ChatMessage, ChatRole, ContextQualityAssessment, ExpectedOutput, RootCause, TemplateAnalysis,
};
use prompt_studio_core::providers::QueryProvider;
use prompt_studio_core::{Result, StudioError};

use crate::llm::{ChatRequest, LlmClient};

const QUERY_TEMPERATURE: f32 = 0.7;
const QUERY_MAX_TOKENS: u32 = 500;
/// Characters of each sample context shown to the designer.
const SAMPLE_PREVIEW_CHARS: usize = 300;

const DESIGN_SYSTEM: &str = "You are an expert query designer for RAG (Retrieval-Augmented Generation) systems.
Your task is to analyze an expected output template and design a GENERIC, REUSABLE query that will retrieve
the necessary information to fill in the template placeholders.

The expected output template uses placeholders like {company_name}, {technology}, etc.
These represent TYPES of information the user needs, not actual values.

CRITICAL RULES:
1. DO NOT reference specific document sections, chapter numbers, page numbers, or document structure
2. DO NOT mention \"Chapter 1\", \"Section 3.2\", \"Appendix A\", or any document-specific identifiers
3. Create queries that work across ANY document containing the relevant information
4. Use generic terminology that would match content in various documents
5. Focus on the TYPE of information needed, not WHERE it might be located

Your query should:
1. Target the specific types of information indicated by placeholders
2. Use common industry terminology likely to appear in various documents
3. Be generic enough to work on different documents about the same topic
4. Cover all the information needs in the template";

const REFINE_SYSTEM: &str = "You are an expert at refining RAG queries based on feedback.
Given an original query and evaluation feedback, create an improved query that addresses the issues.

CRITICAL: The refined query must be GENERIC and work on ANY document:
- DO NOT reference specific chapters, sections, pages, or document structure
- DO NOT mention document-specific identifiers like \"Chapter 4\", \"Section 2.1\", \"Appendix B\"
- Focus on improving the terminology and scope, not document navigation
- Create queries that would work on different documents about the same topic";

pub struct LlmQueryDesigner {
    llm: Arc<LlmClient>,
}

impl LlmQueryDesigner {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    async fn ask(&self, system: &str, user: String, step: &'static str) -> Result<String> {
        let messages = [
            ChatMessage::new(ChatRole::System, system),
            ChatMessage::new(ChatRole::User, user),
        ];
        let reply = self
            .llm
            .chat(
                ChatRequest {
                    messages: &messages,
                    model: None,
                    temperature: QUERY_TEMPERATURE,
                    max_tokens: QUERY_MAX_TOKENS,
                },
                step,
            )
            .await?;

        let query = reply.trim();
        if query.is_empty() {
            return Err(StudioError::provider(step, "model returned an empty query"));
        }
        Ok(query.to_string())
    }
}

#[async_trait]
impl QueryProvider for LlmQueryDesigner {
    async fn design_initial_query(
        &self,
        expected: &ExpectedOutput,
        analysis: &TemplateAnalysis,
        sample_contexts: &[String],
    ) -> Result<String> {
        self.ask(
            DESIGN_SYSTEM,
            design_prompt(expected, analysis, sample_contexts),
            step::INITIAL_QUERY,
        )
        .await
    }

    async fn refine_query(
        &self,
        original_query: &str,
        root_causes: &[RootCause],
        suggestions: &[String],
        assessment: &ContextQualityAssessment,
    ) -> Result<String> {
        self.ask(
            REFINE_SYSTEM,
            refine_prompt(original_query, root_causes, suggestions, assessment),
            step::QUERY_REFINEMENT,
        )
        .await
    }
}

pub fn design_prompt(
    expected: &ExpectedOutput,
    analysis: &TemplateAnalysis,
    sample_contexts: &[String],
) -> String {
    let mut prompt = format!(
        "Expected Output Template:\n{}\n\nDescription: {}\nOutput Format: {}\n",
        expected.template,
        expected.description.as_deref().unwrap_or("Not provided"),
        expected.output_format
    );

    if !analysis.information_requirements.is_empty() {
        prompt.push_str("\nInformation Requirements:\n");
        for req in &analysis.information_requirements {
            prompt.push_str(&format!("- {}\n", req));
        }
    }

    if !sample_contexts.is_empty() {
        prompt.push_str("\nSample of the available content (for terminology only):\n");
        for sample in sample_contexts {
            let preview: String = sample.chars().take(SAMPLE_PREVIEW_CHARS).collect();
            prompt.push_str(&format!("- {}\n", preview.replace('\n', " ")));
        }
    }

    prompt.push_str(
        "\nDesign a GENERIC query that will retrieve information to fill this template.
The query must NOT reference any specific document sections, chapters, or locations.
The query should work on ANY document containing this type of information.

Return ONLY the query text, nothing else.",
    );
    prompt
}

pub fn refine_prompt(
    original_query: &str,
    root_causes: &[RootCause],
    suggestions: &[String],
    assessment: &ContextQualityAssessment,
) -> String {
    let causes: Vec<&str> = root_causes.iter().map(|c| c.as_str()).collect();
    let suggestion_lines: Vec<String> = suggestions.iter().map(|s| format!("- {}", s)).collect();

    format!(
        "Original Query:
{}

Root Causes Identified:
{}

Improvement Suggestions:
{}

Context Analysis:
- Missing information: {}
- Terminology gaps: {}

Create a GENERIC refined query that works on any document.
DO NOT reference specific document sections or chapters.
Return ONLY the refined query text.",
        original_query,
        causes.join(", "),
        suggestion_lines.join("\n"),
        assessment.missing_information.join(", "),
        assessment.terminology_gaps.join(", ")
    )
}
