//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{embedding, endpoints, ingest, jobs, limits, retrieval};
use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Search backend (lexical + vector indexes)
    #[serde(default)]
    pub search: SearchBackendConfig,

    /// Remote embedding and completion services
    #[serde(default)]
    pub remote: RemoteServicesConfig,

    /// Retrieval defaults (limits, weights, thresholds)
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Pipeline deadlines and pooling
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Job registry TTL and sweep cadence
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Bulk embedding-build limits
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Inbound body limit in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_port() -> u16 {
    3000
}

fn default_body_limit() -> usize {
    limits::BODY_LIMIT_BYTES
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

/// Search backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchBackendConfig {
    /// Qdrant endpoint for the ANN index
    #[serde(default = "default_qdrant_endpoint")]
    pub endpoint: String,

    /// Qdrant API key (optional)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Collection holding the corpus vectors
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Embedding dimension enforced on items and the ANN index
    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,

    /// Directory for the Tantivy lexical index (in-memory when unset)
    #[serde(default)]
    pub lexical_index_path: Option<String>,
}

fn default_qdrant_endpoint() -> String {
    endpoints::QDRANT_DEFAULT.to_string()
}

fn default_collection() -> String {
    "healthcare_testcases".to_string()
}

fn default_vector_dim() -> usize {
    embedding::DIMENSION
}

impl Default for SearchBackendConfig {
    fn default() -> Self {
        Self {
            endpoint: default_qdrant_endpoint(),
            api_key: None,
            collection: default_collection(),
            vector_dim: default_vector_dim(),
            lexical_index_path: None,
        }
    }
}

/// Remote service configuration (embedding + completion)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RemoteServicesConfig {
    /// Base URL for the embedding service
    pub embedding_base_url: String,

    /// Embedding model identifier sent with each request
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Base URL for the completion service
    pub completion_base_url: String,

    /// Completion model identifier
    #[serde(default = "default_completion_model")]
    pub completion_model: String,

    /// Account identifier appended to the embedding path
    pub user_id: String,

    /// Bearer token for both services (optional in development)
    #[serde(default)]
    pub auth_token: Option<String>,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_completion_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Retrieval defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    #[serde(default = "default_rerank_top_k")]
    pub rerank_top_k: usize,

    #[serde(default = "default_bm25_weight")]
    pub bm25_weight: f64,

    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,

    /// Threshold for the standalone deduplicate endpoint
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: f64,

    /// Stricter threshold applied inside the pipeline
    #[serde(default = "default_pipeline_dedup_threshold")]
    pub pipeline_dedup_threshold: f64,
}

fn default_limit() -> usize {
    retrieval::DEFAULT_LIMIT
}

fn default_rerank_top_k() -> usize {
    retrieval::DEFAULT_RERANK_TOP_K
}

fn default_bm25_weight() -> f64 {
    retrieval::DEFAULT_BM25_WEIGHT
}

fn default_vector_weight() -> f64 {
    retrieval::DEFAULT_VECTOR_WEIGHT
}

fn default_dedup_threshold() -> f64 {
    retrieval::DEDUP_THRESHOLD
}

fn default_pipeline_dedup_threshold() -> f64 {
    retrieval::PIPELINE_DEDUP_THRESHOLD
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            rerank_top_k: default_rerank_top_k(),
            bm25_weight: default_bm25_weight(),
            vector_weight: default_vector_weight(),
            dedup_threshold: default_dedup_threshold(),
            pipeline_dedup_threshold: default_pipeline_dedup_threshold(),
        }
    }
}

/// Pipeline deadlines and pooling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// End-to-end deadline in seconds
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,

    /// Per-remote-call timeout in seconds
    #[serde(default = "default_remote_timeout")]
    pub remote_call_timeout_secs: u64,

    /// Search backend connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Wait budget for a pool permit in milliseconds
    #[serde(default = "default_pool_wait")]
    pub pool_wait_ms: u64,
}

fn default_deadline() -> u64 {
    limits::PIPELINE_DEADLINE_SECS
}

fn default_remote_timeout() -> u64 {
    limits::REMOTE_CALL_TIMEOUT_SECS
}

fn default_pool_size() -> usize {
    limits::POOL_SIZE
}

fn default_pool_wait() -> u64 {
    limits::POOL_WAIT_MS
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline(),
            remote_call_timeout_secs: default_remote_timeout(),
            pool_size: default_pool_size(),
            pool_wait_ms: default_pool_wait(),
        }
    }
}

/// Job registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_job_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_job_ttl() -> u64 {
    jobs::TTL_SECS
}

fn default_sweep_interval() -> u64 {
    jobs::SWEEP_INTERVAL_SECS
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_job_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Bulk embedding-build limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    #[serde(default = "default_inter_batch_delay")]
    pub inter_batch_delay_ms: u64,

    /// JSON corpus loaded at start-up when set
    #[serde(default)]
    pub corpus_path: Option<String>,
}

fn default_batch_size() -> usize {
    ingest::BATCH_SIZE
}

fn default_max_in_flight() -> usize {
    ingest::MAX_IN_FLIGHT
}

fn default_inter_batch_delay() -> u64 {
    ingest::INTER_BATCH_DELAY_MS
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_in_flight: default_max_in_flight(),
            inter_batch_delay_ms: default_inter_batch_delay(),
            corpus_path: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings.
    ///
    /// Critical remote endpoints must be present; weight and threshold
    /// ranges are checked so a bad deployment fails at start-up rather
    /// than on the first request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote.embedding_base_url.is_empty() {
            return Err(ConfigError::Missing("remote.embedding_base_url"));
        }
        if self.remote.completion_base_url.is_empty() {
            return Err(ConfigError::Missing("remote.completion_base_url"));
        }
        if self.remote.user_id.is_empty() {
            return Err(ConfigError::Missing("remote.user_id"));
        }
        if self.search.endpoint.is_empty() {
            return Err(ConfigError::Missing("search.endpoint"));
        }
        if self.search.collection.is_empty() {
            return Err(ConfigError::Missing("search.collection"));
        }

        if self.search.vector_dim == 0 {
            return Err(ConfigError::InvalidValue {
                field: "search.vector_dim".to_string(),
                message: "must be non-zero".to_string(),
            });
        }

        for (field, value) in [
            ("retrieval.bm25_weight", self.retrieval.bm25_weight),
            ("retrieval.vector_weight", self.retrieval.vector_weight),
            ("retrieval.dedup_threshold", self.retrieval.dedup_threshold),
            (
                "retrieval.pipeline_dedup_threshold",
                self.retrieval.pipeline_dedup_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("must be between 0.0 and 1.0, got {}", value),
                });
            }
        }

        if self.pipeline.pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.pool_size".to_string(),
                message: "pool must hold at least one connection".to_string(),
            });
        }

        Ok(())
    }
}

/// Load settings from files and the environment.
///
/// Priority: env vars > `config/{env}.yaml` > `config/default.yaml` >
/// built-in defaults. Environment variables use the `CASEKB_` prefix
/// with `__` as the section separator, e.g. `CASEKB_SERVER__PORT=8080`.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder()
        .add_source(File::from(Path::new("config/default.yaml")).required(false));

    if let Some(env_name) = env {
        builder = builder
            .add_source(File::from(Path::new(&format!("config/{}.yaml", env_name))).required(false));
    }

    let settings: Settings = builder
        .add_source(Environment::with_prefix("CASEKB").separator("__"))
        .build()?
        .try_deserialize()?;

    Ok(settings)
}
