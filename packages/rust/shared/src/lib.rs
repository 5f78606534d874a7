//! Shared types, error model, and configuration for gradreach.
//!
//! This crate is the foundation depended on by all other gradreach crates.
//! It provides:
//! - [`GradReachError`]: the unified error type
//! - Domain types ([`ContactRecord`], [`ValidationVerdict`], [`RunId`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CollectorConfig, CollectorMode, DEFAULT_TEMPLATE, MessageConfig, MessageSection,
    PipelineConfig, PipelineSection, SenderConfig, TargetConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{GradReachError, Result};
pub use types::{
    ContactRecord, MISSING_SENTINEL, RECOLLECTION_THRESHOLD, RunId, ValidationVerdict, is_missing,
};
