//! Trait seams for pluggable backends
//!
//! All major collaborators sit behind these traits so implementations
//! can be swapped without touching the orchestrator, and so tests can
//! run against mocks.

use async_trait::async_trait;

use crate::candidate::Candidate;
use crate::error::Result;
use crate::filter::{FieldWeights, SearchFilters};
use crate::item::Item;
use crate::llm::{Message, TokenUsage};

/// Token/cost accounting for one remote call
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RemoteUsage {
    pub tokens: u64,
    pub cost: f64,
}

impl RemoteUsage {
    pub fn add(&mut self, other: &RemoteUsage) {
        self.tokens += other.tokens;
        self.cost += other.cost;
    }
}

/// One embedding returned by the embedding service
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector {
    pub vector: Vec<f32>,
    pub usage: RemoteUsage,
}

/// Result of one completion call, envelope cost included
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutcome {
    pub text: String,
    pub usage: TokenUsage,
    pub cost: f64,
    pub model: String,
}

/// BM25 search over the weighted text fields
#[async_trait]
pub trait LexicalSearcher: Send + Sync {
    /// Return at most `top_k` candidates ordered by lexical score
    /// descending, raw backend scores attached. Zero hits is an empty
    /// list, not an error.
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: &SearchFilters,
        weights: &FieldWeights,
    ) -> Result<Vec<Candidate>>;

    /// Distinct values of a keyword metadata field
    async fn distinct(&self, field: &str) -> Result<Vec<String>>;
}

/// ANN search over the dense-vector index.
///
/// Implementations embed the query themselves (one remote embedding
/// call) and report the spend through `RemoteUsage`.
#[async_trait]
pub trait VectorSearcher: Send + Sync {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: &SearchFilters,
        num_candidates: usize,
    ) -> Result<(Vec<Candidate>, RemoteUsage)>;
}

/// Write-side of the vector index, used by the corpus loader and the
/// bulk embedding builds
#[async_trait]
pub trait VectorIndexWriter: Send + Sync {
    async fn upsert(&self, items: &[Item]) -> Result<()>;
}

/// Remote embedding service
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector>;
}

/// Remote completion service
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, messages: &[Message], max_tokens: u32) -> Result<CompletionOutcome>;
}
