//! Search pipeline orchestrator
//!
//! Drives one request through validate → normalise → (lexical ∥ vector)
//! → fuse → deduplicate → summarise, emitting progress checkpoints and
//! accumulating the execution record along the way.
//!
//! ## Failure policy
//!
//! - Empty query: `InvalidArgument` before any stage runs.
//! - Lexical or vector backend failure: the request fails with
//!   `BackendUnavailable`.
//! - Embedding failure (after the client's retries): the pipeline
//!   continues lexical-only and the response is marked `degraded`.
//! - Summariser failure: never aborts retrieval; the summary is `None`
//!   and a warning is attached.
//! - The end-to-end deadline aborts remaining stages with `Timeout`;
//!   in-flight remote calls are dropped with the timed-out future.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};

use casekb_config::constants::{limits, retrieval as retrieval_defaults};
use casekb_core::{
    Candidate, Error, FieldWeights, ItemProjection, QueryTransformation, RankedCandidate,
    RemoteUsage, Result, SearchFilters,
};
use casekb_llm::{SummarizeOutcome, Summarizer, SummaryStyle};
use casekb_retrieval::{
    dedup::{self, DedupDoc, RemovedDoc},
    fusion::{self, FusionPolicy, FusionWeights},
    normalizer::QueryNormalizer,
};

use crate::execution::{ExecutionRecord, StageRecord};

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct SearchPipelineConfig {
    /// End-to-end deadline for one request
    pub deadline: Duration,
    /// Timeout applied to each remote call (retrieval, summarisation)
    pub remote_call_timeout: Duration,
    /// Search backend connection pool size
    pub pool_size: usize,
    /// Wait budget for a pool permit before `Busy`
    pub pool_wait: Duration,
}

impl Default for SearchPipelineConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(limits::PIPELINE_DEADLINE_SECS),
            remote_call_timeout: Duration::from_secs(limits::REMOTE_CALL_TIMEOUT_SECS),
            pool_size: limits::POOL_SIZE,
            pool_wait: Duration::from_millis(limits::POOL_WAIT_MS),
        }
    }
}

/// Per-request options
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub limit: usize,
    /// Candidate pool fetched from each source before fusion
    pub rerank_top_k: usize,
    pub filters: SearchFilters,
    pub field_weights: FieldWeights,
    pub fusion: FusionPolicy,
    pub weights: FusionWeights,
    pub dedup_threshold: f64,
    pub summarize: bool,
    pub summary_style: SummaryStyle,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            limit: retrieval_defaults::DEFAULT_LIMIT,
            rerank_top_k: retrieval_defaults::DEFAULT_RERANK_TOP_K,
            filters: SearchFilters::default(),
            field_weights: FieldWeights::default(),
            fusion: FusionPolicy::Rrf,
            weights: FusionWeights::default(),
            dedup_threshold: retrieval_defaults::PIPELINE_DEDUP_THRESHOLD,
            summarize: false,
            summary_style: SummaryStyle::Concise,
        }
    }
}

/// A progress checkpoint emitted on the watch channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub stage: &'static str,
    pub percent: u8,
}

/// Everything one pipeline run produced
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub transformation: QueryTransformation,
    pub lexical: Vec<Candidate>,
    pub vector: Vec<Candidate>,
    pub fused: Vec<RankedCandidate>,
    pub deduplicated: Vec<RankedCandidate>,
    pub removed: Vec<RemovedDoc>,
    pub summary: Option<SummarizeOutcome>,
    pub execution: ExecutionRecord,
    pub warnings: Vec<String>,
    pub degraded: bool,
}

/// The pipeline orchestrator
pub struct SearchPipeline {
    normalizer: QueryNormalizer,
    lexical: Arc<dyn casekb_core::LexicalSearcher>,
    vector: Arc<dyn casekb_core::VectorSearcher>,
    summarizer: Arc<Summarizer>,
    pool: Arc<Semaphore>,
    config: SearchPipelineConfig,
}

impl SearchPipeline {
    pub fn new(
        lexical: Arc<dyn casekb_core::LexicalSearcher>,
        vector: Arc<dyn casekb_core::VectorSearcher>,
        summarizer: Arc<Summarizer>,
        config: SearchPipelineConfig,
    ) -> Self {
        let pool = Arc::new(Semaphore::new(config.pool_size));
        Self {
            normalizer: QueryNormalizer::default(),
            lexical,
            vector,
            summarizer,
            pool,
            config,
        }
    }

    pub fn with_normalizer(mut self, normalizer: QueryNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Preprocess a query without running retrieval.
    pub fn preprocess(&self, query: &str) -> QueryTransformation {
        self.normalizer.normalize(query)
    }

    /// Run the pipeline, discarding progress.
    pub async fn run(&self, query: &str, options: PipelineOptions) -> Result<PipelineOutcome> {
        let (tx, _rx) = watch::channel(Checkpoint {
            stage: "queued",
            percent: 0,
        });
        self.run_with_progress(query, options, tx).await
    }

    /// Run the pipeline, emitting checkpoints on `progress`.
    ///
    /// Checkpoints are monotonically non-decreasing and reach 100 on
    /// success.
    pub async fn run_with_progress(
        &self,
        query: &str,
        options: PipelineOptions,
        progress: watch::Sender<Checkpoint>,
    ) -> Result<PipelineOutcome> {
        // Backpressure: no queueing past the wait budget.
        let _permit = tokio::time::timeout(self.config.pool_wait, self.pool.acquire())
            .await
            .map_err(|_| Error::Busy("search pool saturated".to_string()))?
            .map_err(|_| Error::Internal("search pool closed".to_string()))?;

        match tokio::time::timeout(
            self.config.deadline,
            self.execute(query, options, &progress),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "pipeline exceeded {}s deadline",
                self.config.deadline.as_secs()
            ))),
        }
    }

    async fn execute(
        &self,
        query: &str,
        options: PipelineOptions,
        progress: &watch::Sender<Checkpoint>,
    ) -> Result<PipelineOutcome> {
        let mut execution = ExecutionRecord::default();
        let mut warnings = Vec::new();
        let mut degraded = false;

        // Stage: validate
        let stage_start = Instant::now();
        if query.trim().is_empty() {
            return Err(Error::InvalidArgument("query must not be empty".to_string()));
        }
        emit(progress, "validate", 5);
        execution.record(StageRecord::new("validate").timed(stage_start.elapsed()));

        // Stage: normalise
        let stage_start = Instant::now();
        let transformation = self.normalizer.normalize(query);
        if transformation.is_empty() {
            return Err(Error::InvalidArgument(
                "query is empty after normalisation".to_string(),
            ));
        }
        emit(progress, "normalise", 10);
        execution.record(
            StageRecord::new("normalise")
                .timed(stage_start.elapsed())
                .counts(1, transformation.expansions.len()),
        );

        // Stage: retrieve (lexical ∥ vector, joined before fusion)
        let stage_start = Instant::now();
        let num_candidates = (options.rerank_top_k * 2).max(retrieval_defaults::MIN_NUM_CANDIDATES);

        let lexical_fut = tokio::time::timeout(
            self.config.remote_call_timeout,
            self.lexical.search(
                &transformation.normalised,
                options.rerank_top_k,
                &options.filters,
                &options.field_weights,
            ),
        );
        let vector_fut = tokio::time::timeout(
            self.config.remote_call_timeout,
            self.vector.search(
                &transformation.normalised,
                options.rerank_top_k,
                &options.filters,
                num_candidates,
            ),
        );

        let (lexical_result, vector_result) = tokio::join!(lexical_fut, vector_fut);

        let lexical_candidates = match lexical_result {
            Err(_) => return Err(Error::Timeout("lexical retrieval".to_string())),
            Ok(Err(e)) => return Err(e),
            Ok(Ok(candidates)) => candidates,
        };

        let (vector_candidates, vector_usage) = match vector_result {
            Err(_) => return Err(Error::Timeout("vector retrieval".to_string())),
            Ok(Err(Error::EmbeddingFailure(msg))) => {
                tracing::warn!(error = %msg, "Embedding failed, continuing lexical-only");
                degraded = true;
                warnings.push(format!("EmbeddingFailure: {}", msg));
                (Vec::new(), RemoteUsage::default())
            }
            Ok(Err(e)) => return Err(e),
            Ok(Ok((candidates, usage))) => (candidates, usage),
        };

        emit(progress, "retrieve", 35);
        // One record for the parallel fan-out; per-source counts live
        // on the outcome itself
        execution.record(
            StageRecord::new("retrieve")
                .timed(stage_start.elapsed())
                .counts(0, lexical_candidates.len() + vector_candidates.len())
                .spend(vector_usage.tokens, vector_usage.cost),
        );

        // Stage: fuse
        let stage_start = Instant::now();
        let fused = fusion::fuse(
            &lexical_candidates,
            &vector_candidates,
            options.fusion,
            options.weights,
            options.limit,
        )?;
        emit(progress, "fuse", 45);
        execution.record(
            StageRecord::new("fuse")
                .timed(stage_start.elapsed())
                .counts(lexical_candidates.len() + vector_candidates.len(), fused.len()),
        );

        // Stage: deduplicate
        let stage_start = Instant::now();
        let docs: Vec<DedupDoc> = fused
            .iter()
            .map(|rc| DedupDoc {
                id: rc.item.id.clone(),
                title: rc.item.title.clone(),
                body: rc.item.full_text(),
            })
            .collect();
        let dedup_outcome = dedup::deduplicate(&docs, options.dedup_threshold);
        let deduplicated: Vec<RankedCandidate> = dedup_outcome
            .kept
            .iter()
            .map(|&idx| fused[idx].clone())
            .collect();
        emit(progress, "deduplicate", 55);
        execution.record(
            StageRecord::new("deduplicate")
                .timed(stage_start.elapsed())
                .counts(fused.len(), deduplicated.len()),
        );

        // Stage: summarise (never fatal)
        let stage_start = Instant::now();
        let mut summary = None;
        if options.summarize && !deduplicated.is_empty() {
            let projections: Vec<ItemProjection> = deduplicated
                .iter()
                .map(|rc| ItemProjection::from(&rc.item))
                .collect();

            match tokio::time::timeout(
                self.config.remote_call_timeout,
                self.summarizer.summarize(&projections, options.summary_style),
            )
            .await
            {
                Ok(Ok(outcome)) => {
                    execution.record(
                        StageRecord::new("summarise")
                            .timed(stage_start.elapsed())
                            .counts(projections.len(), projections.len())
                            .spend(outcome.usage.total_tokens, outcome.cost),
                    );
                    warnings.extend(outcome.warnings.clone());
                    summary = Some(outcome);
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Summarisation failed, returning partial result");
                    warnings.push(format!("SummariserFailure: {}", e));
                    execution.record(
                        StageRecord::new("summarise")
                            .timed(stage_start.elapsed())
                            .counts(projections.len(), 0)
                            .failed(e.to_string()),
                    );
                }
                Err(_) => {
                    warnings.push("SummariserFailure: deadline exceeded".to_string());
                    execution.record(
                        StageRecord::new("summarise")
                            .timed(stage_start.elapsed())
                            .counts(projections.len(), 0)
                            .failed("deadline exceeded"),
                    );
                }
            }
        }
        emit(progress, "summarise", 75);

        emit(progress, "done", 100);

        Ok(PipelineOutcome {
            transformation,
            lexical: lexical_candidates,
            vector: vector_candidates,
            fused,
            deduplicated,
            removed: dedup_outcome.removed,
            summary,
            execution,
            warnings,
            degraded,
        })
    }
}

fn emit(progress: &watch::Sender<Checkpoint>, stage: &'static str, percent: u8) {
    // Nobody listening is fine; progress is advisory
    let _ = progress.send(Checkpoint { stage, percent });
}
