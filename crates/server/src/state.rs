//! Application state
//!
//! Shared state across all handlers.

use std::sync::Arc;

use casekb_config::Settings;
use casekb_core::{LexicalSearcher, VectorSearcher};
use casekb_llm::Summarizer;
use casekb_pipeline::{JobRegistry, SearchPipeline};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub pipeline: Arc<SearchPipeline>,
    pub lexical: Arc<dyn LexicalSearcher>,
    pub vector: Arc<dyn VectorSearcher>,
    pub summarizer: Arc<Summarizer>,
    pub jobs: Arc<JobRegistry>,
}

impl AppState {
    pub fn new(
        config: Settings,
        pipeline: Arc<SearchPipeline>,
        lexical: Arc<dyn LexicalSearcher>,
        vector: Arc<dyn VectorSearcher>,
        summarizer: Arc<Summarizer>,
        jobs: Arc<JobRegistry>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            pipeline,
            lexical,
            vector,
            summarizer,
            jobs,
        }
    }
}
