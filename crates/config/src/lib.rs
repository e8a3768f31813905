//! Configuration management for the relia query service
//!
//! Supports loading configuration from:
//! - Built-in defaults (the threshold and weight values the scorers assume)
//! - An optional TOML file
//! - Environment variables (`RELIA__` prefix, `__` separator)

mod settings;

pub use settings::{
    AuthConfig, ChunkingConfig, EmbeddingProviderConfig, LlmProviderConfig, RateLimitConfig,
    RetrievalConfig, ScoringConfig, ServerConfig, Settings, StorageConfig, VerificationConfig,
    load_settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
