//! Shared error taxonomy
//!
//! Every failure surfaced over HTTP maps onto one of these variants.
//! Crate-local errors (`RetrievalError`, `LlmError`, ...) convert into
//! this taxonomy at the crate boundary.

use thiserror::Error;

/// Result alias used across the workspace
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline-wide error taxonomy
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Caller fault: missing query, bad weights, unknown fusion method
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Search backend connect/query failure
    #[error("Search backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Embedding service failed after retries
    #[error("Embedding service failure: {0}")]
    EmbeddingFailure(String),

    /// Summariser unavailable after its single retry
    #[error("Summariser failure: {0}")]
    SummariserFailure(String),

    /// Deadline exceeded
    #[error("Deadline exceeded: {0}")]
    Timeout(String),

    /// Connection pool saturated past the wait budget
    #[error("Server busy: {0}")]
    Busy(String),

    /// Unknown job id or missing resource
    #[error("Not found: {0}")]
    NotFound(String),

    /// Anything that should never reach a caller unexplained
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether retrying the same request could succeed.
    ///
    /// Only idempotent reads are retried locally (embedding, search);
    /// everything else propagates.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::BackendUnavailable(_) | Error::EmbeddingFailure(_) | Error::Timeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::BackendUnavailable("down".into()).is_transient());
        assert!(Error::Timeout("30s".into()).is_transient());
        assert!(!Error::InvalidArgument("bad weights".into()).is_transient());
        assert!(!Error::NotFound("job".into()).is_transient());
    }
}
