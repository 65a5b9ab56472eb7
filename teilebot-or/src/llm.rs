//! LLM client abstraction
//!
//! A handful of pipeline stages (heuristic candidate proposal, relevance
//! filtering, reverse aftermarket lookup, final re-verification) call a chat
//! completion model. The `LlmClient` trait keeps those stages testable with
//! scripted responses; `ChatCompletionClient` talks to any OpenAI-compatible
//! endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default transport timeout, matching the `llm_ms` config default. The
/// pipeline additionally enforces its configured per-call budget around
/// every completion.
const LLM_TIMEOUT: Duration = Duration::from_secs(10);

/// LLM error
#[derive(Debug, Error)]
pub enum LlmError {
    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// API-level error (auth, rate limit, malformed request)
    #[error("API error: {0}")]
    Api(String),

    /// Response could not be parsed into the expected shape
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Chat completion interface.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one completion with a system instruction and a user prompt.
    ///
    /// # Errors
    /// Returns `LlmError` on transport or API failure. Callers in the
    /// pipeline treat any error as "stage skipped", never as fatal.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError>;

    /// Run a completion and parse the answer as JSON.
    ///
    /// Strips Markdown code fences, which models add despite instructions.
    async fn complete_json(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<serde_json::Value, LlmError> {
        let raw = self.complete(system, prompt).await?;
        let trimmed = strip_code_fences(&raw);
        serde_json::from_str(trimmed)
            .map_err(|e| LlmError::Parse(format!("{}: {}", e, truncate(trimmed, 200))))
    }
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ============================================================================
// OpenAI-compatible client
// ============================================================================

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Client for OpenAI-compatible chat completion endpoints.
pub struct ChatCompletionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatCompletionClient {
    /// Create a client for `endpoint` (the full `/chat/completions` URL).
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self::with_timeout(endpoint, api_key, model, LLM_TIMEOUT)
    }

    /// Create a client with an explicit transport timeout, typically the
    /// configured `llm_ms` budget.
    pub fn with_timeout(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl LlmClient for ChatCompletionClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            // Deterministic output for extraction/validation prompts
            temperature: 0.0,
        };

        debug!("LLM call, model={}", self.model);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::Api(format!(
                "status {}",
                response.status().as_u16()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Parse("empty choices array".to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
