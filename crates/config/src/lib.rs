//! Configuration for the CaseKB retrieval backend
//!
//! Settings are layered: built-in defaults, then an optional
//! `config/{env}.yaml` overlay, then `CASEKB_`-prefixed environment
//! variables (highest priority). Critical values are validated at
//! start-up and a missing one aborts the process.

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, IngestConfig, JobsConfig, ObservabilityConfig, PipelineConfig,
    RemoteServicesConfig, RetrievalConfig, SearchBackendConfig, ServerConfig,
    Settings,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
