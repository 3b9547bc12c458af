//! Embedding-service client
//!
//! One remote call per query embedding, up to three attempts in total
//! with exponential backoff capped at ten seconds. Only transient
//! errors (network, timeout, 5xx) are retried; a 4xx fails
//! immediately.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use casekb_config::constants::embedding as defaults;
use casekb_core::{EmbeddingBackend, EmbeddingVector, RemoteUsage};

use crate::LlmError;

/// Embedding client configuration
#[derive(Debug, Clone)]
pub struct EmbeddingClientConfig {
    /// Service base URL
    pub base_url: String,
    /// Account identifier appended to the request path
    pub user_id: String,
    /// Model identifier sent with each request
    pub model: String,
    /// Bearer token (optional)
    pub auth_token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Total attempts for transient failures, the first call included
    pub max_attempts: u32,
    /// Initial backoff, doubled per attempt
    pub initial_backoff: Duration,
    /// Backoff ceiling
    pub max_backoff: Duration,
}

impl Default for EmbeddingClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            user_id: String::new(),
            model: "text-embedding-3-small".to_string(),
            auth_token: None,
            timeout: Duration::from_secs(30),
            max_attempts: defaults::MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(defaults::INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_secs(defaults::MAX_BACKOFF_SECS),
        }
    }
}

/// Client for the remote embedding service
pub struct EmbeddingClient {
    client: Client,
    config: EmbeddingClientConfig,
}

impl EmbeddingClient {
    pub fn new(config: EmbeddingClientConfig) -> Result<Self, LlmError> {
        if config.base_url.is_empty() {
            return Err(LlmError::Configuration(
                "embedding base URL is required".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!(
            "{}/embedding/text/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.user_id
        )
    }

    /// Embed one text, retrying transient failures.
    pub async fn embed_text(&self, text: &str) -> Result<EmbeddingVector, LlmError> {
        let request = EmbeddingRequest {
            input: text,
            model: &self.config.model,
        };

        let mut last_error = None;
        let mut backoff = self.config.initial_backoff;

        for attempt in 0..self.config.max_attempts {
            if attempt > 0 {
                tracing::warn!(
                    attempt,
                    max_attempts = self.config.max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    "Embedding request failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(self.config.max_backoff);
            }

            match self.execute(&request).await {
                Ok(vector) => return Ok(vector),
                Err(e) if e.is_retryable() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Network("retries exhausted".to_string())))
    }

    async fn execute(&self, request: &EmbeddingRequest<'_>) -> Result<EmbeddingVector, LlmError> {
        let mut builder = self.client.post(self.url()).json(request);
        if let Some(ref token) = self.config.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(LlmError::Network(format!("HTTP {}: {}", status, body)));
            }
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| LlmError::InvalidResponse("empty data array".to_string()))?;

        Ok(EmbeddingVector {
            vector,
            usage: RemoteUsage {
                tokens: parsed.usage.total_tokens,
                cost: parsed.cost,
            },
        })
    }
}

#[async_trait::async_trait]
impl EmbeddingBackend for EmbeddingClient {
    async fn embed(&self, text: &str) -> casekb_core::Result<EmbeddingVector> {
        self.embed_text(text)
            .await
            .map_err(|e| casekb_core::Error::EmbeddingFailure(e.to_string()))
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[allow(dead_code)]
    #[serde(default)]
    status: Option<String>,
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: EmbeddingUsage,
    #[serde(default)]
    cost: f64,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct EmbeddingUsage {
    #[serde(default)]
    total_tokens: u64,
}
