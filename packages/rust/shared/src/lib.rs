//! Shared types, error model, event schema, and configuration for Tenderflow.
//!
//! This crate is the foundation depended on by all other Tenderflow crates.
//! It provides:
//! - [`TenderflowError`]: the unified error type
//! - Domain types ([`DecisionRecord`], [`FormDetection`], [`DeadlineInfo`], [`MetadataRecord`])
//! - The observer event schema ([`PipelineEvent`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod events;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_COMPANY_PROFILE, EmbeddingConfig, FilterConfig, GeminiConfig,
    OutputFolders, ProcessingConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, validate_api_key, validate_config,
};
pub use error::{Result, TenderflowError};
pub use events::{LogLevel, PdfStatus, PipelineEvent, Stage};
pub use types::{
    Confidence, DeadlineInfo, DecisionMethod, DecisionRecord, FormDetection, MetadataRecord, RunId,
};
