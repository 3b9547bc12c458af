//! Core types for the CaseKB retrieval backend
//!
//! This crate provides the foundations shared by all other crates:
//! - The stored `Item` and its summariser-facing projection
//! - Candidate and ranked-candidate records produced by retrieval
//! - The query transformation record emitted by preprocessing
//! - Metadata filters and lexical field weights
//! - The shared error taxonomy
//! - Async trait seams for pluggable search and LLM backends

pub mod candidate;
pub mod error;
pub mod filter;
pub mod item;
pub mod llm;
pub mod query;
pub mod traits;

pub use candidate::{Candidate, RankedCandidate, SourceTag};
pub use error::{Error, Result};
pub use filter::{FieldWeights, SearchFilters};
pub use item::{Item, ItemProjection};
pub use llm::{Message, Role, TokenUsage};
pub use query::{AppliedRewrite, NormalizeOptions, QueryTransformation};
pub use traits::{
    CompletionBackend, CompletionOutcome, EmbeddingBackend, EmbeddingVector, LexicalSearcher,
    RemoteUsage, VectorIndexWriter, VectorSearcher,
};
