//! OpenRouter advisor.
//!
//! Sends a cycle summary to one model through OpenRouter's unified
//! chat-completions API (OpenAI-compatible format) and parses a
//! `DECISION` / `CONFIDENCE` answer. The council runs one of these per
//! configured model.
//!
//! API docs: https://openrouter.ai/docs/api-reference/chat-completion

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Advisor, CycleSummary, Recommendation};
use crate::types::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Maximum retries on rate limit / server errors.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (ms).
const BASE_BACKOFF_MS: u64 = 1000;

const SYSTEM_PROMPT: &str = "You review cryptocurrency triangular arbitrage trades proposed by an \
automated engine. The engine has already checked fees, position limits and liquidity. Judge only \
whether current conditions make the cycle likely to complete at the quoted prices. Answer with a \
short rationale followed by exactly two lines:\nDECISION: EXECUTE or HOLD\nCONFIDENCE: a number \
between 0 and 1";

// ---------------------------------------------------------------------------
// API types (OpenAI-compatible)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OpenRouterAdvisor {
    http: Client,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
}

impl OpenRouterAdvisor {
    /// - `api_key`: OpenRouter API key.
    /// - `model`: model ID (e.g. "anthropic/claude-sonnet-4").
    /// - `max_tokens`: max output tokens per request.
    /// - `timeout`: per-request HTTP timeout.
    pub fn new(api_key: SecretString, model: &str, max_tokens: u32, timeout: std::time::Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build OpenRouter HTTP client")?;

        Ok(Self {
            http,
            api_key,
            model: model.to_string(),
            max_tokens,
        })
    }

    fn request(&self, summary: &CycleSummary) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: summary.to_prompt(),
                },
            ],
        }
    }

    /// Send a chat completion request with retry + exponential backoff.
    async fn call(&self, request: &ChatRequest) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, model = %self.model, "Retrying OpenRouter API call");
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let resp = self
                .http
                .post(OPENROUTER_API_URL)
                .header("Authorization", format!("Bearer {}", self.api_key.expose_secret()))
                .header("Content-Type", "application/json")
                .header("X-Title", "arb-engine advisory council")
                .json(request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: ChatResponse = response
                            .json()
                            .await
                            .context("Failed to parse OpenRouter response")?;
                        return extract_text(body);
                    }

                    // Retryable errors: 429 (rate limit), 5xx
                    if status.as_u16() == 429 || status.is_server_error() {
                        let error_text = response.text().await.unwrap_or_default();
                        warn!(
                            status = %status,
                            attempt,
                            model = %self.model,
                            error = %error_text,
                            "Retryable OpenRouter error"
                        );
                        last_error = Some(format!("HTTP {status}: {error_text}"));
                        continue;
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    return Err(EngineError::Advisory {
                        model: self.model.clone(),
                        message: format!("HTTP {status}: {error_text}"),
                    }
                    .into());
                }
                Err(e) => {
                    warn!(attempt, model = %self.model, error = %e, "OpenRouter request failed");
                    last_error = Some(format!("Request error: {e}"));
                    continue;
                }
            }
        }

        Err(EngineError::Advisory {
            model: self.model.clone(),
            message: format!(
                "failed after {} retries: {}",
                MAX_RETRIES,
                last_error.unwrap_or_default()
            ),
        }
        .into())
    }
}

fn extract_text(body: ChatResponse) -> Result<String> {
    if let Some(actual) = body.model.as_deref() {
        debug!(model = actual, "OpenRouter response");
    }
    body.choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .map(|m| m.content)
        .filter(|text| !text.trim().is_empty())
        .context("OpenRouter response has no message content")
}

#[async_trait]
impl Advisor for OpenRouterAdvisor {
    async fn review(&self, summary: &CycleSummary) -> Result<Recommendation> {
        let text = self.call(&self.request(summary)).await?;
        Recommendation::parse(&text).with_context(|| format!("Unusable answer from {}", self.model))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
