//! Remote language-model clients for the CaseKB backend
//!
//! - `embedding`: the embedding-service client with retry and backoff
//! - `completion`: the completion-service client; its `transaction`
//!   envelope stays explicit so cost accounting is never dropped
//! - `summarizer`: prompt assembly, payload guards and the non-fatal
//!   failure contract for candidate digests

pub mod completion;
pub mod embedding;
pub mod summarizer;

pub use completion::{CompletionClient, CompletionClientConfig};
pub use embedding::{EmbeddingClient, EmbeddingClientConfig};
pub use summarizer::{
    strip_markdown_fence, SummarizeOutcome, Summarizer, SummarizerConfig, SummaryStyle,
};

use thiserror::Error;

/// LLM client errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LlmError {
    /// Transient errors are worth a retry; caller faults are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Network(_) | LlmError::Timeout)
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}
