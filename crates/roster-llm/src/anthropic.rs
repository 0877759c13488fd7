//! Anthropic Messages API client
//!
//! Each call sends the full accumulated history. Conversation state lives in
//! the caller (and in checkpoints), never in the client.

use crate::auth;
use crate::circuit_breaker::CircuitBreaker;
use crate::model::LanguageModel;
use crate::types::{AnthropicRequest, AnthropicResponse, CompletionRequest, Model, ModelReply};
use async_trait::async_trait;
use roster_core::{Result, RosterError};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: usize = 8192;

// Rate limit retry configuration
const MAX_RETRIES: u32 = 5;
const INITIAL_BACKOFF_SECS: u64 = 2;
const MAX_BACKOFF_SECS: u64 = 60;

/// Anthropic implementation of [`LanguageModel`]
#[derive(Debug, Clone)]
pub struct AnthropicModel {
    model: Model,
    max_tokens: usize,
    api_key: String,
    api_url: String,
    http: reqwest::Client,
    breaker: Arc<CircuitBreaker>,
}

impl AnthropicModel {
    /// Create a client with an explicit API key
    pub fn new(model: Model, api_key: impl Into<String>) -> Self {
        Self {
            model,
            max_tokens: DEFAULT_MAX_TOKENS,
            api_key: api_key.into(),
            api_url: ANTHROPIC_API_URL.to_string(),
            http: reqwest::Client::new(),
            breaker: Arc::new(CircuitBreaker::default()),
        }
    }

    /// Create a client reading the key from `api_key_env`
    pub fn from_env(model: Model, api_key_env: &str) -> Result<Self> {
        Ok(Self::new(model, auth::get_auth_token(api_key_env)?))
    }

    /// Set max tokens for responses
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Point the client at a different endpoint (proxies, test servers)
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn model(&self) -> Model {
        self.model
    }

    fn circuit_open_error(&self) -> RosterError {
        RosterError::ApiLimit(format!(
            "Circuit breaker is OPEN - too many API failures. Wait {} seconds before retry.",
            self.breaker.time_until_retry() / 1000
        ))
    }
}

#[async_trait]
impl LanguageModel for AnthropicModel {
    #[instrument(skip(self, request), fields(tag = %request.tag, model = %self.model, messages = request.messages.len()))]
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply> {
        // Check circuit breaker before attempting API call
        if !self.breaker.can_execute() {
            return Err(self.circuit_open_error());
        }

        let body = AnthropicRequest {
            model: self.model.api_name().to_string(),
            max_tokens: self.max_tokens,
            system: &request.system,
            messages: &request.messages,
            tools: &request.tools,
        };

        // Retry loop with exponential backoff for rate limits
        let mut retries = 0;
        let mut backoff_secs = INITIAL_BACKOFF_SECS;

        loop {
            tracing::debug!("Sending request to Anthropic API (attempt {})", retries + 1);

            let response = self
                .http
                .post(&self.api_url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(|e| RosterError::Api(format!("Failed to send request: {}", e)))?;

            let status = response.status();

            // Handle rate limit (429) with retry
            if status.as_u16() == 429 {
                retries += 1;

                if retries > MAX_RETRIES {
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown".to_string());
                    return Err(RosterError::ApiLimit(format!(
                        "Rate limit exceeded after {} retries. Last error: {}",
                        MAX_RETRIES, error_text
                    )));
                }

                // Parse retry-after header if present, otherwise use exponential backoff
                let wait_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(backoff_secs);

                tracing::warn!(
                    "Rate limited (429). Waiting {} seconds before retry {}/{}",
                    wait_secs,
                    retries,
                    MAX_RETRIES
                );

                tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                continue;
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown".to_string());

                // Retry on 5xx errors
                if status.is_server_error() && retries < MAX_RETRIES {
                    retries += 1;
                    tracing::warn!(
                        "Server error ({}). Waiting {} seconds before retry {}/{}",
                        status,
                        backoff_secs,
                        retries,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                    continue;
                }

                self.breaker.record_failure();
                tracing::error!(
                    "Circuit breaker: recorded failure (count: {})",
                    self.breaker.failure_count()
                );

                return Err(RosterError::Api(format!(
                    "Anthropic API error {}: {}",
                    status, error_text
                )));
            }

            let parsed: AnthropicResponse = response
                .json()
                .await
                .map_err(|e| RosterError::Api(format!("Failed to parse response: {}", e)))?;

            if parsed.content.is_empty() {
                return Err(RosterError::Api("No content in response".to_string()));
            }

            self.breaker.record_success();

            if let Some(ref usage) = parsed.usage {
                tracing::info!(
                    "Completion for {} done ({} input tokens, {} output tokens, stop: {:?})",
                    request.tag,
                    usage.input_tokens,
                    usage.output_tokens,
                    parsed.stop_reason
                );
            }

            return Ok(ModelReply {
                content: parsed.content,
                stop_reason: parsed.stop_reason,
                usage: parsed.usage,
            });
        }
    }

    fn name(&self) -> &str {
        self.model.api_name()
    }
}
