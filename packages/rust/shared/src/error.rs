//! Error types for Tenderflow.
//!
//! Library crates use [`TenderflowError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Tenderflow operations.
#[derive(Debug, thiserror::Error)]
pub enum TenderflowError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to an oracle.
    #[error("network error: {0}")]
    Network(String),

    /// The oracle answered, but with an error status or an unusable payload.
    #[error("oracle error: {0}")]
    Oracle(String),

    /// JSON or response parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// PDF loading, text sampling, or page splitting error.
    #[error("pdf error: {0}")]
    Pdf(String),

    /// PDF-to-DOCX conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Decision cache or metadata store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input, missing tender, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A pipeline run is already in progress on this instance.
    #[error("a pipeline run is already in progress")]
    AlreadyRunning,

    /// The background lane failed (panicked or was torn down).
    #[error("background lane failed: {0}")]
    Lane(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TenderflowError>;

impl TenderflowError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a PDF error from any displayable message.
    pub fn pdf(msg: impl Into<String>) -> Self {
        Self::Pdf(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
