//! Error types for gradreach.
//!
//! Library crates use [`GradReachError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all gradreach operations.
#[derive(Debug, thiserror::Error)]
pub enum GradReachError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while fetching the listing page.
    #[error("network error: {0}")]
    Network(String),

    /// The collector capability failed to produce any output.
    #[error("collector error: {0}")]
    Collector(String),

    /// Collector output could not be read as a contact list, even leniently.
    /// Carries the raw text for diagnosis.
    #[error("parse error: {message}")]
    Parse { message: String, raw: String },

    /// Message template is malformed or references an unknown field.
    #[error("template error: {message}")]
    Template { message: String },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GradReachError>;

impl GradReachError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error, keeping the offending raw text.
    pub fn parse(msg: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
            raw: raw.into(),
        }
    }

    /// Create a template error from any displayable message.
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Raw collector text attached to this error, if any.
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            Self::Parse { raw, .. } => Some(raw),
            _ => None,
        }
    }
}
