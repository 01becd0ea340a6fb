//! OpenAI-compatible chat client.
//!
//! All language-model calls (generation, judging, query design) go through
//! [`LlmClient::chat`]. Each call reads one [`ProviderCell`] snapshot for
//! its credentials, base URL, and default model. Calls are not retried;
//! any failure is returned as a provider error for the calling step.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prompt_studio_core::error::step;
use prompt_studio_core::models::{ChatMessage, ChatPrompt, ChatRole};
use prompt_studio_core::providers::GenerationProvider;
use prompt_studio_core::{Result, StudioError};
use serde::Serialize;
use serde_json::Value;

use crate::config::LlmConfig;
use crate::settings::ProviderCell;

/// Message sent by the connection test.
pub const CONNECTION_PROBE: &str = "Say 'OK' if you can hear me.";

/// One chat request. `model: None` uses the configured model.
#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
    pub messages: &'a [ChatMessage],
    pub model: Option<&'a str>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
    pub status: String,
    pub model: String,
    pub response: String,
}

pub struct LlmClient {
    enabled: bool,
    cell: Arc<ProviderCell>,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: &LlmConfig, cell: Arc<ProviderCell>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StudioError::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            enabled: config.is_enabled(),
            cell,
            client,
        })
    }

    pub fn cell(&self) -> &Arc<ProviderCell> {
        &self.cell
    }

    /// Send a chat completion request and return the first choice's text.
    pub async fn chat(&self, request: ChatRequest<'_>, step: &'static str) -> Result<String> {
        if !self.enabled {
            return Err(StudioError::Configuration(
                "llm provider is disabled; set [llm] provider = \"openai\" in the config file"
                    .into(),
            ));
        }
        let settings = self.cell.snapshot();
        let api_key = settings.require_key(step)?;
        let model = request.model.unwrap_or(settings.model.as_str());
        let url = format!("{}/chat/completions", settings.base_url.trim_end_matches('/'));

        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| serde_json::json!({"role": m.role.as_str(), "content": m.content}))
            .collect();
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        tracing::debug!(step, model, messages = messages.len(), "chat request");
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| StudioError::provider(step, format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(StudioError::provider(
                step,
                format!("LLM API error {}: {}", status, body_text),
            ));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| StudioError::provider(step, format!("invalid LLM response: {}", e)))?;
        parse_chat_response(&json).map_err(|msg| StudioError::provider(step, msg))
    }

    /// Round-trip a tiny prompt to verify credentials and endpoint.
    pub async fn test_connection(&self) -> Result<ConnectionReport> {
        let model = self.cell.snapshot().model.clone();
        let messages = [ChatMessage::new(ChatRole::User, CONNECTION_PROBE)];
        let response = self
            .chat(
                ChatRequest {
                    messages: &messages,
                    model: Some(&model),
                    temperature: 0.0,
                    max_tokens: 10,
                },
                step::GENERATION,
            )
            .await?;
        Ok(ConnectionReport {
            status: "connected".into(),
            model,
            response,
        })
    }
}

/// `choices[0].message.content` of a chat completion.
pub fn parse_chat_response(json: &Value) -> std::result::Result<String, String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| "invalid LLM response: missing choices[0].message.content".to_string())
}

/// Generates the answer for an assembled prompt.
pub struct ChatGenerator {
    llm: Arc<LlmClient>,
}

impl ChatGenerator {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl GenerationProvider for ChatGenerator {
    async fn generate(&self, prompt: &ChatPrompt) -> Result<String> {
        let defaults = self.llm.cell().snapshot();
        self.llm
            .chat(
                ChatRequest {
                    messages: &prompt.messages,
                    model: prompt.model.as_deref(),
                    temperature: prompt.temperature.unwrap_or(defaults.temperature),
                    max_tokens: prompt.max_tokens.unwrap_or(defaults.max_tokens),
                },
                step::GENERATION,
            )
            .await
    }
}
