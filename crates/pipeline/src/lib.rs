//! Pipeline orchestration for the CaseKB backend
//!
//! Drives preprocessing, parallel retrieval, fusion, deduplication and
//! summarisation for one request, with per-stage timing/cost records,
//! a progress stream, deadlines and graceful degradation. Also owns
//! the background job registry and the bulk embedding-build runner.

pub mod execution;
pub mod ingest;
pub mod jobs;
pub mod orchestrator;

pub use execution::{ExecutionRecord, StageRecord};
pub use ingest::{EmbeddingBuildRunner, IngestLimits};
pub use jobs::{FileResult, Job, JobRegistry, JobStatus};
pub use orchestrator::{
    Checkpoint, PipelineOptions, PipelineOutcome, SearchPipeline, SearchPipelineConfig,
};
