//! Error types shared across the workspace.

use thiserror::Error;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced at the core boundary.
///
/// Recoverable signal degradation (structured-output parse failures, empty
/// rewrites, skipped optional checks) is handled inline with neutral defaults
/// and never reaches this type. These variants are the hard failures.
#[derive(Error, Debug)]
pub enum Error {
    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("retrieval error: {0}")]
    Retrieval(String),

    #[error("generation error: {0}")]
    Generation(String),

    #[error("ingestion error: {0}")]
    Ingestion(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl Error {
    /// Build an embedding error from any displayable cause.
    pub fn embedding(cause: impl std::fmt::Display) -> Self {
        Self::Embedding(cause.to_string())
    }

    /// Build an LLM error from any displayable cause.
    pub fn llm(cause: impl std::fmt::Display) -> Self {
        Self::Llm(cause.to_string())
    }

    /// Build a storage error from any displayable cause.
    pub fn storage(cause: impl std::fmt::Display) -> Self {
        Self::Storage(cause.to_string())
    }
}
