//! Completion-service client
//!
//! Speaks the OpenAI-style chat shape but the service wraps its payload
//! in a `transaction` object that carries the billed cost. The envelope
//! is modelled explicitly: dropping it silently would lose cost
//! accounting.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use casekb_core::{CompletionBackend, CompletionOutcome, Message, TokenUsage};

use crate::LlmError;

/// Completion client configuration
#[derive(Debug, Clone)]
pub struct CompletionClientConfig {
    pub base_url: String,
    pub model: String,
    pub auth_token: Option<String>,
    pub timeout: Duration,
    pub temperature: f32,
}

impl Default for CompletionClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            model: "gpt-4o-mini".to_string(),
            auth_token: None,
            timeout: Duration::from_secs(30),
            temperature: 0.3,
        }
    }
}

/// Client for the remote completion service
pub struct CompletionClient {
    client: Client,
    config: CompletionClientConfig,
}

impl CompletionClient {
    pub fn new(config: CompletionClientConfig) -> Result<Self, LlmError> {
        if config.base_url.is_empty() {
            return Err(LlmError::Configuration(
                "completion base URL is required".to_string(),
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
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    pub async fn chat(
        &self,
        messages: &[Message],
        max_tokens: u32,
    ) -> Result<CompletionOutcome, LlmError> {
        let request = CompletionRequest {
            model: &self.config.model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            max_tokens,
            temperature: self.config.temperature,
        };

        let mut builder = self.client.post(self.url()).json(&request);
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

        let envelope: TransactionEnvelope = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let transaction = envelope.transaction;
        let choice = transaction
            .response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;

        let usage = transaction.response.usage.unwrap_or_default();

        Ok(CompletionOutcome {
            text: choice.message.content,
            usage: TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            },
            cost: transaction.cost,
            model: self.config.model.clone(),
        })
    }
}

#[async_trait::async_trait]
impl CompletionBackend for CompletionClient {
    async fn complete(
        &self,
        messages: &[Message],
        max_tokens: u32,
    ) -> casekb_core::Result<CompletionOutcome> {
        self.chat(messages, max_tokens).await.map_err(|e| match e {
            LlmError::Timeout => casekb_core::Error::Timeout("completion call".to_string()),
            other => casekb_core::Error::SummariserFailure(other.to_string()),
        })
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

/// The service's billing envelope; `cost` lives here, not on the inner
/// chat response.
#[derive(Debug, Deserialize)]
struct TransactionEnvelope {
    transaction: Transaction,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    response: ChatResponse,
    #[serde(default)]
    cost: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_base_url() {
        assert!(matches!(
            CompletionClient::new(CompletionClientConfig::default()),
            Err(LlmError::Configuration(_))
        ));
    }

    #[test]
    fn test_url_shape() {
        let config = CompletionClientConfig {
            base_url: "http://completions.local/".to_string(),
            ..Default::default()
        };
        let client = CompletionClient::new(config).unwrap();
        assert_eq!(client.url(), "http://completions.local/v1/chat/completions");
    }

    #[test]
    fn test_envelope_deserialization_keeps_cost() {
        let json = r#"{
            "transaction": {
                "response": {
                    "choices": [{"message": {"role": "assistant", "content": "Digest."}}],
                    "usage": {"prompt_tokens": 120, "completion_tokens": 40, "total_tokens": 160}
                },
                "cost": 0.0042
            }
        }"#;
        let envelope: TransactionEnvelope = serde_json::from_str(json).unwrap();
        assert!((envelope.transaction.cost - 0.0042).abs() < f64::EPSILON);
        assert_eq!(
            envelope.transaction.response.choices[0].message.content,
            "Digest."
        );
        assert_eq!(
            envelope.transaction.response.usage.as_ref().unwrap().total_tokens,
            160
        );
    }

    #[test]
    fn test_request_serialization() {
        let request = CompletionRequest {
            model: "gpt-4o-mini",
            messages: vec![WireMessage {
                role: "user".to_string(),
                content: "Summarise".to_string(),
            }],
            max_tokens: 256,
            temperature: 0.3,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("max_tokens"));
        assert!(json.contains("gpt-4o-mini"));
    }
}
