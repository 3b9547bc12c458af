//! CaseKB server entry point

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use casekb_config::{load_settings, Settings};
use casekb_llm::{
    CompletionClient, CompletionClientConfig, EmbeddingClient, EmbeddingClientConfig, Summarizer,
    SummarizerConfig,
};
use casekb_pipeline::{
    EmbeddingBuildRunner, IngestLimits, JobRegistry, SearchPipeline, SearchPipelineConfig,
};
use casekb_retrieval::{
    CorpusLoader, LexicalIndex, LexicalIndexConfig, QdrantVectorSearcher, TantivyLexicalSearcher,
    VectorSearchConfig,
};
use casekb_server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Priority: env vars > config/{env}.yaml > config/default.yaml > defaults
    let env = std::env::var("CASEKB_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&config);

    tracing::info!("Starting CaseKB server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        config_env = env.as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    // Missing critical values abort start-up
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Configuration invalid");
        std::process::exit(1);
    }

    // Lexical index (Tantivy)
    let lexical_index = Arc::new(LexicalIndex::new(LexicalIndexConfig {
        index_path: config.search.lexical_index_path.clone(),
    })?);
    tracing::info!(
        docs = lexical_index.doc_count(),
        path = config.search.lexical_index_path.as_deref().unwrap_or("<ram>"),
        "Lexical index ready"
    );

    // Remote clients
    let embedder = Arc::new(EmbeddingClient::new(EmbeddingClientConfig {
        base_url: config.remote.embedding_base_url.clone(),
        user_id: config.remote.user_id.clone(),
        model: config.remote.embedding_model.clone(),
        auth_token: config.remote.auth_token.clone(),
        timeout: Duration::from_secs(config.pipeline.remote_call_timeout_secs),
        ..Default::default()
    })?);

    let completion = Arc::new(CompletionClient::new(CompletionClientConfig {
        base_url: config.remote.completion_base_url.clone(),
        model: config.remote.completion_model.clone(),
        auth_token: config.remote.auth_token.clone(),
        timeout: Duration::from_secs(config.pipeline.remote_call_timeout_secs),
        ..Default::default()
    })?);

    // Vector index (Qdrant)
    let vector = Arc::new(QdrantVectorSearcher::new(
        VectorSearchConfig {
            endpoint: config.search.endpoint.clone(),
            collection: config.search.collection.clone(),
            vector_dim: config.search.vector_dim,
            api_key: config.search.api_key.clone(),
        },
        embedder.clone(),
    )?);
    vector.ensure_collection().await?;
    tracing::info!(
        endpoint = %config.search.endpoint,
        collection = %config.search.collection,
        "Vector index ready"
    );

    let summarizer = Arc::new(Summarizer::new(completion, SummarizerConfig::default()));

    let jobs = Arc::new(JobRegistry::new(Duration::from_secs(config.jobs.ttl_secs)));
    let _sweep_shutdown =
        jobs.start_sweep_task(Duration::from_secs(config.jobs.sweep_interval_secs));

    // Optional corpus load + background embedding build for items
    // shipped without vectors
    if let Some(ref corpus_path) = config.ingest.corpus_path {
        let loader = CorpusLoader::new(config.search.vector_dim);
        let items = loader.load_file(Path::new(corpus_path))?;
        lexical_index.index_items(&items)?;

        let (with_vectors, without_vectors): (Vec<_>, Vec<_>) =
            items.into_iter().partition(|i| i.embedding.is_some());

        if !with_vectors.is_empty() {
            use casekb_core::VectorIndexWriter;
            vector.upsert(&with_vectors).await?;
        }
        tracing::info!(
            indexed = with_vectors.len() + without_vectors.len(),
            vectors = with_vectors.len(),
            pending_embedding = without_vectors.len(),
            "Corpus loaded"
        );

        if !without_vectors.is_empty() {
            let runner = EmbeddingBuildRunner::new(
                embedder.clone(),
                vector.clone(),
                jobs.clone(),
                IngestLimits {
                    batch_size: config.ingest.batch_size,
                    max_in_flight: config.ingest.max_in_flight,
                    inter_batch_delay: Duration::from_millis(config.ingest.inter_batch_delay_ms),
                },
            );
            let source = corpus_path.clone();
            tokio::spawn(async move {
                match runner.run(&source, without_vectors).await {
                    Ok(job_id) => tracing::info!(job_id = %job_id, "Embedding build started at boot"),
                    Err(e) => tracing::error!(error = %e, "Embedding build failed to start"),
                }
            });
        }
    }

    let pipeline = Arc::new(SearchPipeline::new(
        Arc::new(TantivyLexicalSearcher::new(lexical_index.clone())),
        vector.clone(),
        summarizer.clone(),
        SearchPipelineConfig {
            deadline: Duration::from_secs(config.pipeline.deadline_secs),
            remote_call_timeout: Duration::from_secs(config.pipeline.remote_call_timeout_secs),
            pool_size: config.pipeline.pool_size,
            pool_wait: Duration::from_millis(config.pipeline.pool_wait_ms),
        },
    ));

    let port = config.server.port;
    let state = AppState::new(
        config,
        pipeline,
        Arc::new(TantivyLexicalSearcher::new(lexical_index)),
        vector,
        summarizer,
        jobs,
    );

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "casekb={},tower_http=info",
            config.observability.log_level
        )
        .into()
    });

    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
