//! HTTP endpoints
//!
//! All request/response bodies are JSON; everything lives under `/api`.
//! Handlers stay thin: parse, delegate to the pipeline or a single
//! component, shape the envelope.

use axum::{
    extract::{DefaultBodyLimit, Json, Path, State},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use casekb_core::{Error, ItemProjection, NormalizeOptions, SearchFilters};
use casekb_llm::SummaryStyle;
use casekb_pipeline::{PipelineOptions, PipelineOutcome};
use casekb_retrieval::fusion::{FusionPolicy, FusionWeights};
use casekb_retrieval::{dedup, DedupDoc, QueryNormalizer};

use crate::state::AppState;
use crate::ApiError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;

    Router::new()
        // Retrieval endpoints
        .route("/api/search", post(vector_search))
        .route("/api/search/bm25", post(bm25_search))
        .route("/api/search/hybrid", post(hybrid_search))
        .route("/api/search/rerank", post(rerank_search))
        // Pipeline stages exposed standalone
        .route("/api/search/preprocess", post(preprocess))
        .route("/api/search/deduplicate", post(deduplicate))
        .route("/api/search/summarize", post(summarize))
        // Metadata
        .route("/api/metadata/distinct", get(metadata_distinct))
        // Jobs
        .route("/api/jobs/active", get(active_jobs))
        .route("/api/jobs/:id", get(get_job))
        // Health check
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

fn require_query(query: &str) -> Result<(), ApiError> {
    if query.trim().is_empty() {
        return Err(Error::InvalidArgument("query must not be empty".to_string()).into());
    }
    Ok(())
}

fn timing_json(outcome: &PipelineOutcome) -> serde_json::Value {
    json!({
        "totalMs": outcome.execution.total_duration_ms,
        "stages": outcome.execution.stages,
    })
}

fn stats_json(outcome: &PipelineOutcome) -> serde_json::Value {
    json!({
        "lexicalCount": outcome.lexical.len(),
        "vectorCount": outcome.vector.len(),
        "fusedCount": outcome.fused.len(),
        "deduplicatedCount": outcome.deduplicated.len(),
        "duplicatesRemoved": outcome.removed.len(),
    })
}

// ---------------------------------------------------------------------------
// Retrieval
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    limit: Option<usize>,
    filters: Option<SearchFilters>,
}

/// Pure vector path
async fn vector_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_query(&request.query)?;
    let limit = request.limit.unwrap_or(state.config.retrieval.default_limit);
    let filters = request.filters.unwrap_or_default();
    let num_candidates =
        (limit * 2).max(casekb_config::constants::retrieval::MIN_NUM_CANDIDATES);

    let (results, usage) = state
        .vector
        .search(&request.query, limit, &filters, num_candidates)
        .await?;

    Ok(Json(json!({
        "success": true,
        "query": request.query,
        "filters": filters,
        "results": results,
        "cost": usage.cost,
        "tokens": usage.tokens,
    })))
}

#[derive(Debug, Deserialize)]
struct Bm25Request {
    query: String,
    limit: Option<usize>,
    filters: Option<SearchFilters>,
    fields: Option<Vec<String>>,
}

async fn bm25_search(
    State(state): State<AppState>,
    Json(request): Json<Bm25Request>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_query(&request.query)?;
    let limit = request.limit.unwrap_or(state.config.retrieval.default_limit);
    let filters = request.filters.unwrap_or_default();

    let weights = casekb_core::FieldWeights::default();
    let weights = match request.fields {
        Some(ref fields) => weights.restrict_to(fields),
        None => weights,
    };
    if weights.is_empty() {
        return Err(Error::InvalidArgument("no searchable fields selected".to_string()).into());
    }

    let started = Instant::now();
    let results = state
        .lexical
        .search(&request.query, limit, &filters, &weights)
        .await?;

    Ok(Json(json!({
        "success": true,
        "searchType": "bm25",
        "results": results,
        "count": results.len(),
        "searchTime": started.elapsed().as_millis() as u64,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HybridRequest {
    query: String,
    limit: Option<usize>,
    filters: Option<SearchFilters>,
    bm25_weight: Option<f64>,
    vector_weight: Option<f64>,
    bm25_fields: Option<Vec<String>>,
}

async fn hybrid_search(
    State(state): State<AppState>,
    Json(request): Json<HybridRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_query(&request.query)?;
    let retrieval = &state.config.retrieval;

    let weights = FusionWeights::new(
        request.bm25_weight.unwrap_or(retrieval.bm25_weight),
        request.vector_weight.unwrap_or(retrieval.vector_weight),
    );
    let field_weights = casekb_core::FieldWeights::default();
    let field_weights = match request.bm25_fields {
        Some(ref fields) => field_weights.restrict_to(fields),
        None => field_weights,
    };

    let options = PipelineOptions {
        limit: request.limit.unwrap_or(retrieval.default_limit),
        rerank_top_k: retrieval.rerank_top_k,
        filters: request.filters.unwrap_or_default(),
        field_weights,
        fusion: FusionPolicy::WeightedNormalised,
        weights,
        dedup_threshold: retrieval.pipeline_dedup_threshold,
        summarize: false,
        summary_style: SummaryStyle::Concise,
    };

    let outcome = state.pipeline.run(&request.query, options).await?;

    Ok(Json(json!({
        "success": true,
        "searchType": "hybrid",
        "results": outcome.deduplicated,
        "stats": stats_json(&outcome),
        "timing": timing_json(&outcome),
        "cost": outcome.execution.total_cost,
        "tokens": outcome.execution.total_tokens,
        "degraded": outcome.degraded,
        "warnings": outcome.warnings,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RerankRequest {
    query: String,
    limit: Option<usize>,
    filters: Option<SearchFilters>,
    fusion_method: String,
    rerank_top_k: Option<usize>,
    bm25_weight: Option<f64>,
    vector_weight: Option<f64>,
    #[serde(default)]
    summarize: bool,
    summary_type: Option<String>,
}

async fn rerank_search(
    State(state): State<AppState>,
    Json(request): Json<RerankRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_query(&request.query)?;
    let retrieval = &state.config.retrieval;

    let fusion: FusionPolicy = request.fusion_method.parse().map_err(ApiError::from)?;
    let summary_style: SummaryStyle = request
        .summary_type
        .as_deref()
        .unwrap_or("concise")
        .parse()
        .map_err(ApiError::from)?;

    let options = PipelineOptions {
        limit: request.limit.unwrap_or(retrieval.default_limit),
        rerank_top_k: request.rerank_top_k.unwrap_or(retrieval.rerank_top_k),
        filters: request.filters.unwrap_or_default(),
        field_weights: casekb_core::FieldWeights::default(),
        fusion,
        weights: FusionWeights::new(
            request.bm25_weight.unwrap_or(retrieval.bm25_weight),
            request.vector_weight.unwrap_or(retrieval.vector_weight),
        ),
        dedup_threshold: retrieval.pipeline_dedup_threshold,
        summarize: request.summarize,
        summary_style,
    };

    let outcome = state.pipeline.run(&request.query, options).await?;

    // "Before" is the raw per-source view; "after" is the fused order
    let mut before = Vec::with_capacity(outcome.lexical.len() + outcome.vector.len());
    before.extend(outcome.lexical.iter().cloned());
    before.extend(outcome.vector.iter().cloned());

    Ok(Json(json!({
        "success": true,
        "fusionMethod": fusion.as_str(),
        "results": outcome.deduplicated,
        "beforeReranking": before,
        "afterReranking": outcome.fused,
        "stats": stats_json(&outcome),
        "timing": timing_json(&outcome),
        "cost": outcome.execution.total_cost,
        "tokens": outcome.execution.total_tokens,
        "summary": outcome.summary.as_ref().map(|s| s.summary.clone()),
        "degraded": outcome.degraded,
        "warnings": outcome.warnings,
    })))
}

// ---------------------------------------------------------------------------
// Standalone pipeline stages
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PreprocessRequest {
    query: String,
    options: Option<NormalizeOptions>,
}

async fn preprocess(
    State(state): State<AppState>,
    Json(request): Json<PreprocessRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let transformation = match request.options {
        Some(options) => QueryNormalizer::new(options).normalize(&request.query),
        None => state.pipeline.preprocess(&request.query),
    };
    Ok(Json(json!({
        "success": true,
        "transformation": transformation,
    })))
}

#[derive(Debug, Deserialize)]
struct DeduplicateRequest {
    results: Vec<serde_json::Value>,
    threshold: Option<f64>,
}

async fn deduplicate(
    State(state): State<AppState>,
    Json(request): Json<DeduplicateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let threshold = request
        .threshold
        .unwrap_or(state.config.retrieval.dedup_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(
            Error::InvalidArgument(format!("threshold must be in [0, 1], got {}", threshold))
                .into(),
        );
    }

    let docs: Vec<DedupDoc> = request
        .results
        .iter()
        .map(|value| {
            let projection = ItemProjection::from_value(value);
            DedupDoc {
                id: projection.id,
                title: projection.title,
                body: format!("{} {}", projection.description, projection.acceptance_criteria),
            }
        })
        .collect();

    let outcome = dedup::deduplicate(&docs, threshold);
    let deduplicated: Vec<&serde_json::Value> =
        outcome.kept.iter().map(|&i| &request.results[i]).collect();
    let duplicates: Vec<serde_json::Value> = outcome
        .removed
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "duplicateOf": r.duplicate_of,
                "similarity": r.similarity,
                "result": request.results[r.index].clone(),
            })
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "deduplicated": deduplicated,
        "duplicates": duplicates,
        "stats": {
            "inputCount": request.results.len(),
            "outputCount": outcome.kept.len(),
            "removedCount": outcome.removed.len(),
            "threshold": threshold,
        },
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummarizeRequest {
    results: Vec<serde_json::Value>,
    summary_type: String,
}

async fn summarize(
    State(state): State<AppState>,
    Json(request): Json<SummarizeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let style: SummaryStyle = request.summary_type.parse().map_err(ApiError::from)?;
    if request.results.is_empty() {
        return Err(Error::InvalidArgument("results must not be empty".to_string()).into());
    }

    let projections: Vec<ItemProjection> = request
        .results
        .iter()
        .map(ItemProjection::from_value)
        .collect();

    match state.summarizer.summarize(&projections, style).await {
        Ok(outcome) => Ok(Json(json!({
            "success": true,
            "summary": outcome.summary,
            "tokens": outcome.usage,
            "cost": outcome.cost,
            "model": outcome.model,
            "warnings": outcome.warnings,
        }))),
        // Summariser failure is non-fatal by contract: 200 with a null
        // summary and a warning
        Err(Error::SummariserFailure(msg)) => Ok(Json(json!({
            "success": true,
            "summary": null,
            "tokens": null,
            "cost": 0.0,
            "model": null,
            "warnings": [format!("SummariserFailure: {}", msg)],
        }))),
        Err(other) => Err(other.into()),
    }
}

// ---------------------------------------------------------------------------
// Metadata and jobs
// ---------------------------------------------------------------------------

async fn metadata_distinct(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (modules, priorities, risks, types) = tokio::try_join!(
        state.lexical.distinct("module"),
        state.lexical.distinct("priority"),
        state.lexical.distinct("risk"),
        state.lexical.distinct("type"),
    )?;

    Ok(Json(json!({
        "success": true,
        "modules": modules,
        "priorities": priorities,
        "risks": risks,
        "types": types,
    })))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job = state.jobs.get(&id)?;
    Ok(Json(json!({ "success": true, "job": job })))
}

async fn active_jobs(State(state): State<AppState>) -> Json<serde_json::Value> {
    let jobs = state.jobs.list_active();
    Json(json!({
        "success": true,
        "count": jobs.len(),
        "jobs": jobs,
    }))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use casekb_core::{
        Candidate, CompletionBackend, CompletionOutcome, Message, RemoteUsage, Result,
        TokenUsage,
    };
    use casekb_llm::{Summarizer, SummarizerConfig};
    use casekb_pipeline::{JobRegistry, SearchPipeline, SearchPipelineConfig};
    use casekb_retrieval::{LexicalIndex, LexicalIndexConfig, TantivyLexicalSearcher};
    use std::sync::Arc;
    use std::time::Duration;

    struct EmptyVector;

    #[async_trait]
    impl casekb_core::VectorSearcher for EmptyVector {
        async fn search(
            &self,
            _query: &str,
            _top_k: usize,
            _filters: &SearchFilters,
            _num_candidates: usize,
        ) -> Result<(Vec<Candidate>, RemoteUsage)> {
            Ok((Vec::new(), RemoteUsage::default()))
        }
    }

    struct EchoCompletion;

    #[async_trait]
    impl CompletionBackend for EchoCompletion {
        async fn complete(
            &self,
            _messages: &[Message],
            _max_tokens: u32,
        ) -> Result<CompletionOutcome> {
            Ok(CompletionOutcome {
                text: "summary".to_string(),
                usage: TokenUsage::default(),
                cost: 0.0,
                model: "test".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_router_creation() {
        let index = Arc::new(LexicalIndex::new(LexicalIndexConfig::default()).unwrap());
        let lexical = Arc::new(TantivyLexicalSearcher::new(index));
        let vector = Arc::new(EmptyVector);
        let summarizer = Arc::new(Summarizer::new(
            Arc::new(EchoCompletion),
            SummarizerConfig::default(),
        ));
        let pipeline = Arc::new(SearchPipeline::new(
            lexical.clone(),
            vector.clone(),
            summarizer.clone(),
            SearchPipelineConfig::default(),
        ));
        let state = AppState::new(
            casekb_config::Settings::default(),
            pipeline,
            lexical,
            vector,
            summarizer,
            Arc::new(JobRegistry::new(Duration::from_secs(3600))),
        );
        let _ = create_router(state);
    }
}
