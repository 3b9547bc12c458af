//! Retrieval for the CaseKB backend
//!
//! Features:
//! - Query normalisation with abbreviation and synonym expansion
//! - Lexical BM25 search via Tantivy with per-field boosts and
//!   single-edit fuzziness
//! - Dense ANN search via Qdrant with remote query embeddings
//! - Rank fusion (RRF, weighted-normalised, weighted-reciprocal)
//! - Similarity-threshold deduplication
//! - Corpus loading into both indexes

pub mod corpus;
pub mod dedup;
pub mod fusion;
pub mod lexical;
pub mod normalizer;
pub mod vector;

pub use corpus::CorpusLoader;
pub use dedup::{deduplicate, DedupDoc, DedupOutcome, RemovedDoc};
pub use fusion::{fuse, FusionPolicy, FusionWeights};
pub use lexical::{LexicalIndex, LexicalIndexConfig, TantivyLexicalSearcher};
pub use normalizer::QueryNormalizer;
pub use vector::{QdrantVectorSearcher, VectorSearchConfig};

use thiserror::Error;

/// Retrieval errors
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Index error: {0}")]
    Index(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Corpus error: {0}")]
    Corpus(String),

    #[error("Dimension mismatch: expected {expected}, got {actual} for item {id}")]
    Dimension {
        id: String,
        expected: usize,
        actual: usize,
    },
}

impl From<RetrievalError> for casekb_core::Error {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::Search(msg) | RetrievalError::Connection(msg) => {
                casekb_core::Error::BackendUnavailable(msg)
            }
            other => casekb_core::Error::Internal(other.to_string()),
        }
    }
}
