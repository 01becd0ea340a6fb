//! LLM judge for generated outputs and retrieved context.
//!
//! The judge is asked for a single JSON object. Replies are parsed
//! leniently: surrounding prose or code fences are ignored, scores are
//! clamped to `[0, 1]`, and root causes outside the known set are dropped.

use std::sync::Arc;

use async_trait::async_trait;
use prompt_studio_core::error::step;
use prompt_studio_core::models::{
    ChatMessage, ChatRole, ContextQualityAssessment, EvaluationResult, ExpectedOutput, RootCause,
};
use prompt_studio_core::providers::EvaluationProvider;
use prompt_studio_core::{Result, StudioError};
use serde_json::Value;

use crate::llm::{ChatRequest, LlmClient};

const JUDGE_TEMPERATURE: f32 = 0.2;
const JUDGE_MAX_TOKENS: u32 = 1000;

const EVALUATION_SYSTEM: &str = r#"You are a strict evaluator of retrieval-augmented generation output.
Compare the GENERATED OUTPUT against the EXPECTED OUTPUT TEMPLATE. Placeholders like {name} in the template stand for information the output should contain.

Score how well the generated output matches the template's structure AND fills every placeholder with information supported by the context.

Respond with ONLY a JSON object:
{
  "match_score": <number between 0.0 and 1.0>,
  "root_causes": [<zero or more of "context_missing", "terminology_mismatch", "structure_mismatch", "ambiguity", "retrieval_quality">],
  "improvement_suggestions": [<short strings>],
  "is_successful": <true if the output is usable as-is>
}"#;

const CONTEXT_SYSTEM: &str = r#"You assess whether retrieved context contains the information needed to fill an output template.

Respond with ONLY a JSON object:
{
  "relevant_chunks": <number of context chunks that help fill the template>,
  "relevance_score": <number between 0.0 and 1.0>,
  "missing_information": [<template information not present in the context>],
  "terminology_gaps": [<terms the template uses that the context expresses differently>]
}"#;

pub struct LlmJudge {
    llm: Arc<LlmClient>,
}

impl LlmJudge {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    async fn ask(&self, system: &str, user: String, step: &'static str) -> Result<Value> {
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
                    temperature: JUDGE_TEMPERATURE,
                    max_tokens: JUDGE_MAX_TOKENS,
                },
                step,
            )
            .await?;
        extract_json(&reply).ok_or_else(|| {
            StudioError::provider(step, format!("judge reply is not a JSON object: {}", reply))
        })
    }
}

#[async_trait]
impl EvaluationProvider for LlmJudge {
    async fn evaluate(
        &self,
        generated_output: &str,
        expected: &ExpectedOutput,
        contexts: &[String],
        iteration: usize,
    ) -> Result<EvaluationResult> {
        let mut user = format!(
            "EXPECTED OUTPUT TEMPLATE:\n{}\n\nDescription: {}\n",
            expected.template,
            expected.description.as_deref().unwrap_or("Not provided")
        );
        if !expected.examples.is_empty() {
            user.push_str("\nEXAMPLES OF GOOD OUTPUT:\n");
            for example in &expected.examples {
                user.push_str(&format!("---\n{}\n", example));
            }
        }
        user.push_str(&format!(
            "\nRETRIEVED CONTEXT ({} chunks):\n{}\n\nGENERATED OUTPUT:\n{}",
            contexts.len(),
            contexts.join("\n\n---\n\n"),
            generated_output
        ));

        let json = self.ask(EVALUATION_SYSTEM, user, step::EVALUATION).await?;
        Ok(parse_evaluation(&json, generated_output, iteration))
    }

    async fn assess_context_quality(
        &self,
        expected: &ExpectedOutput,
        contexts: &[String],
    ) -> Result<ContextQualityAssessment> {
        let numbered: Vec<String> = contexts
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[{}] {}", i + 1, c))
            .collect();
        let user = format!(
            "OUTPUT TEMPLATE:\n{}\n\nCONTEXT CHUNKS:\n{}",
            expected.template,
            numbered.join("\n\n")
        );

        let json = self
            .ask(CONTEXT_SYSTEM, user, step::CONTEXT_ASSESSMENT)
            .await?;
        Ok(parse_assessment(&json, contexts.len()))
    }
}

/// The outermost `{...}` in `reply`, parsed as JSON.
pub fn extract_json(reply: &str) -> Option<Value> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str::<Value>(&reply[start..=end])
        .ok()
        .filter(|v| v.is_object())
}

pub fn parse_evaluation(json: &Value, generated_output: &str, iteration: usize) -> EvaluationResult {
    EvaluationResult {
        iteration,
        generated_output: generated_output.to_string(),
        match_score: clamp_unit(json.get("match_score")),
        root_causes: json
            .get("root_causes")
            .and_then(|v| v.as_array())
            .map(|causes| {
                causes
                    .iter()
                    .filter_map(|c| c.as_str())
                    .filter_map(|c| c.parse::<RootCause>().ok())
                    .collect()
            })
            .unwrap_or_default(),
        improvement_suggestions: string_list(json.get("improvement_suggestions")),
        is_successful: json
            .get("is_successful")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
    }
}

pub fn parse_assessment(json: &Value, total_chunks: usize) -> ContextQualityAssessment {
    let relevant = json
        .get("relevant_chunks")
        .and_then(|v| v.as_u64())
        .map(|n| (n as usize).min(total_chunks))
        .unwrap_or(0);
    ContextQualityAssessment {
        total_chunks,
        relevant_chunks: relevant,
        relevance_score: clamp_unit(json.get("relevance_score")),
        missing_information: string_list(json.get("missing_information")),
        terminology_gaps: string_list(json.get("terminology_gaps")),
    }
}

fn clamp_unit(value: Option<&Value>) -> f64 {
    value
        .and_then(|v| v.as_f64())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
        .unwrap_or(0.0)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|s| s.as_str())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}
