//! Template-driven prompt assembly.
//!
//! Builds a two-message chat prompt: a system message that pins the
//! output format to the user's template, and a user message carrying the
//! retrieved context, the query, and the task. Also provides the OpenAI
//! export shape and a plain-text transcript rendering.

use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, ChatPrompt, ChatRole, ExpectedOutput, TemplateAnalysis};

/// Phrase the model is told to use for facts absent from the context.
pub const NOT_SPECIFIED: &str = "Not specified in the document";

/// Model parameters stamped onto every assembled prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

/// Assemble the chat prompt for one optimization iteration.
pub fn assemble_prompt(
    expected: &ExpectedOutput,
    query: &str,
    contexts: &[String],
    analysis: Option<&TemplateAnalysis>,
    params: &GenerationParams,
) -> ChatPrompt {
    ChatPrompt {
        messages: vec![
            ChatMessage::new(ChatRole::System, system_message(expected, analysis)),
            ChatMessage::new(ChatRole::User, user_message(query, contexts, expected)),
        ],
        model: Some(params.model.clone()),
        temperature: Some(params.temperature),
        max_tokens: Some(params.max_tokens),
    }
}

fn system_message(expected: &ExpectedOutput, analysis: Option<&TemplateAnalysis>) -> String {
    let template = expected.template.as_str();
    let mut parts: Vec<String> = vec![
        "You are a precise information extraction assistant.".into(),
        "Your PRIMARY task is to extract information from documents and format it EXACTLY according to the user's specified output template.".into(),
        String::new(),
        "## CRITICAL: Output Format Requirements".into(),
        "You MUST follow the EXACT structure, format, and organization specified in the template below.".into(),
        String::new(),
        "### Expected Output Template:".into(),
        "```".into(),
        template.to_string(),
        "```".into(),
    ];

    let format_specs = format_directives(template);
    if !format_specs.is_empty() {
        parts.push(String::new());
        parts.push("### Format Specifications:".into());
        parts.extend(format_specs.into_iter().map(String::from));
    }

    if let Some(desc) = expected.description.as_deref().filter(|d| !d.is_empty()) {
        parts.push(String::new());
        parts.push(format!("### Additional Context: {}", desc));
    }

    if let Some(style) = expected.output_instructions.as_deref().filter(|s| !s.is_empty()) {
        parts.push(String::new());
        parts.push("## Response Style Instructions".into());
        parts.push("Follow these instructions for how to format and style your response:".into());
        for line in style.trim().lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with(|c: char| matches!(c, '-' | '•' | '*' | '1'..='9')) {
                parts.push(line.to_string());
            } else {
                parts.push(format!("- {}", line));
            }
        }
    }

    if let Some(analysis) = analysis.filter(|a| !a.placeholders.is_empty()) {
        parts.push(String::new());
        parts.push("### Information to Extract:".into());
        for p in &analysis.placeholders {
            parts.push(format!("- {}: Extract the {} value", p.name, p.detected_type));
        }
    }

    parts.push(String::new());
    parts.push("## Instructions".into());
    parts.push("1. Read the provided context carefully".into());
    parts.push("2. Extract ONLY information explicitly stated in the context".into());
    parts.push(
        "3. Fill each point/section in the template with relevant information from the context"
            .into(),
    );
    parts.push(format!(
        "4. If specific information is not found, write '{}'",
        NOT_SPECIFIED
    ));
    parts.push("5. **CRITICAL**: Your output MUST match the template structure EXACTLY - same headings, same numbered points, same format".into());
    parts.push("6. Do NOT add extra sections or change the organization".into());
    parts.push("7. Follow ALL response style instructions provided above".into());

    if !expected.examples.is_empty() {
        parts.push(String::new());
        parts.push("## Examples of Expected Output:".into());
        for (i, example) in expected.examples.iter().enumerate() {
            parts.push(format!("Example {}: {}", i + 1, example));
        }
    }

    parts.join("\n")
}

/// Format-preservation directives implied by the template's layout.
fn format_directives(template: &str) -> Vec<&'static str> {
    let has_numbered = template.lines().any(|line| {
        let line = line.trim();
        (1..10).any(|i| line.starts_with(&format!("{}.", i)))
    });
    let has_bullets = template
        .lines()
        .any(|line| line.trim().starts_with(['-', '•', '*']));
    let has_sections = template.contains(':') || template.contains("\n\n");

    let mut out = Vec::new();
    if has_numbered {
        out.push("- Maintain the EXACT numbered list format (1., 2., 3., etc.)");
        out.push("- Keep the same number of points as specified in the template");
    }
    if has_bullets {
        out.push("- Use the same bullet style as the template");
    }
    if has_sections {
        out.push("- Preserve all section headers and structure");
    }
    out
}

fn user_message(query: &str, contexts: &[String], expected: &ExpectedOutput) -> String {
    let mut parts: Vec<String> = vec![
        "## Context".into(),
        "The following information has been retrieved from the documents:".into(),
        String::new(),
    ];

    for (i, context) in contexts.iter().enumerate() {
        parts.push(format!("### Source {}", i + 1));
        parts.push(context.clone());
        parts.push(String::new());
    }

    parts.push("## Query".into());
    parts.push(query.to_string());
    parts.push(String::new());
    parts.push("## Task".into());
    parts.push("Based on the context above, provide the output in this exact format:".into());
    parts.push(expected.template.clone());

    parts.join("\n")
}

/// A message in the OpenAI request shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedMessage {
    pub role: String,
    pub content: String,
}

/// A prompt in the OpenAI chat-completions request shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedPrompt {
    pub model: Option<String>,
    pub messages: Vec<ExportedMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatPrompt {
    /// Flatten into the request body accepted by chat-completions APIs.
    pub fn to_export(&self) -> ExportedPrompt {
        ExportedPrompt {
            model: self.model.clone(),
            messages: self
                .messages
                .iter()
                .map(|m| ExportedMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Render as a readable transcript, each message tagged `<|role|>`.
    pub fn render_transcript(&self) -> String {
        let mut parts = Vec::with_capacity(self.messages.len() * 3);
        for m in &self.messages {
            parts.push(format!("<|{}|>", m.role.as_str()));
            parts.push(m.content.clone());
            parts.push(String::new());
        }
        parts.join("\n")
    }
}
