//! Centralized constants shared across the retrieval crates.
//!
//! Kept in one place so the retriever, fuser and HTTP layer agree on
//! defaults without re-declaring them.

/// Retrieval defaults
pub mod retrieval {
    /// Default number of results returned to the caller
    pub const DEFAULT_LIMIT: usize = 10;

    /// Default candidate pool fetched from each source before fusion
    pub const DEFAULT_RERANK_TOP_K: usize = 50;

    /// Reciprocal Rank Fusion constant
    pub const RRF_K: f64 = 60.0;

    /// Default lexical weight for hybrid fusion
    pub const DEFAULT_BM25_WEIGHT: f64 = 0.4;

    /// Default vector weight for hybrid fusion
    pub const DEFAULT_VECTOR_WEIGHT: f64 = 0.6;

    /// Standalone deduplication threshold
    pub const DEDUP_THRESHOLD: f64 = 0.85;

    /// Stricter threshold used inside the pipeline
    pub const PIPELINE_DEDUP_THRESHOLD: f64 = 0.95;

    /// ANN candidate floor: `num_candidates >= max(top_k * 2, this)`
    pub const MIN_NUM_CANDIDATES: usize = 100;
}

/// Lexical field boosts applied to the compound BM25 query
pub mod field_weights {
    pub const ID: f32 = 10.0;
    pub const TITLE: f32 = 8.0;
    pub const MODULE: f32 = 5.0;
    pub const DESCRIPTION: f32 = 2.0;
    pub const EXPECTED_RESULTS: f32 = 1.5;
    pub const STEPS: f32 = 1.0;
    pub const PRE_REQUISITES: f32 = 0.8;
}

/// Embedding defaults
pub mod embedding {
    /// Vector dimension expected by the ANN index
    pub const DIMENSION: usize = 1536;

    /// Total attempts for the remote embedding call (the first call
    /// plus two retries)
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Initial retry backoff in milliseconds (doubles per attempt)
    pub const INITIAL_BACKOFF_MS: u64 = 500;

    /// Backoff ceiling in seconds
    pub const MAX_BACKOFF_SECS: u64 = 10;
}

/// Summariser payload guards
pub mod summary {
    /// Items included in the prompt regardless of input size
    pub const MAX_ITEMS: usize = 5;

    /// Per-field character caps applied before prompt assembly
    pub const DESCRIPTION_CHARS: usize = 200;
    pub const BUSINESS_VALUE_CHARS: usize = 150;
    pub const ACCEPTANCE_CHARS: usize = 200;
}

/// Deadlines and pooling
pub mod limits {
    /// End-to-end pipeline deadline in seconds
    pub const PIPELINE_DEADLINE_SECS: u64 = 300;

    /// Per-remote-call timeout in seconds
    pub const REMOTE_CALL_TIMEOUT_SECS: u64 = 30;

    /// Search backend connection pool size
    pub const POOL_SIZE: usize = 20;

    /// How long a request waits for a pool permit before `Busy`
    pub const POOL_WAIT_MS: u64 = 2_000;

    /// Inbound body limit in bytes (50 MB)
    pub const BODY_LIMIT_BYTES: usize = 50 * 1024 * 1024;
}

/// Background job registry
pub mod jobs {
    /// Records older than this are evicted (seconds)
    pub const TTL_SECS: u64 = 3_600;

    /// Sweep cadence (seconds)
    pub const SWEEP_INTERVAL_SECS: u64 = 600;
}

/// Bulk embedding builds
pub mod ingest {
    pub const BATCH_SIZE: usize = 100;
    pub const MAX_IN_FLIGHT: usize = 5;
    pub const INTER_BATCH_DELAY_MS: u64 = 1_000;
}

/// Default endpoints, overridable through settings
pub mod endpoints {
    pub const QDRANT_DEFAULT: &str = "http://localhost:6334";
}
