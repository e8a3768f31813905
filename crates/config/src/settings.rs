//! Settings tree.
//!
//! Every tunable the pipeline reads lives here. Defaults mirror the values
//! the decision gates were calibrated against; overriding them via file or
//! environment is supported but rarely necessary.

use config::{Config, Environment, File};
use relia_core::QueryMode;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// HTTP server binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Bearer-key authentication.
///
/// Auth is disabled when `api_keys` is empty (a warning is logged once at
/// startup). Paths in `public_paths` bypass auth entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub api_keys: Vec<String>,
    pub public_paths: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            public_paths: vec!["/health".to_string()],
        }
    }
}

/// Per-key sliding-window rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
        }
    }
}

/// Chat-completions LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    /// Base URL of an OpenAI-compatible endpoint
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Retry attempts for transient failures
    pub max_retries: u32,
    /// Initial backoff, doubled per retry
    pub initial_backoff_ms: u64,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/v1".to_string(),
            api_key: None,
            model: "llama3.1:8b-instruct".to_string(),
            temperature: 0.1,
            max_tokens: 4096,
            timeout_secs: 60,
            max_retries: 3,
            initial_backoff_ms: 100,
        }
    }
}

/// Embedding provider.
///
/// When `endpoint` is empty the service falls back to the deterministic
/// hash embedder (lexical, not semantic — fine for tests and demos).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingProviderConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            batch_size: 100,
        }
    }
}

/// Retrieval fan-out parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub bm25_top_k: usize,
    pub vector_top_k: usize,
    /// RRF constant
    pub rrf_k: u32,
    /// Candidates kept after reranking
    pub rerank_top_n: usize,
    /// Widened per-side K used by the expansion fallback
    pub fallback_expand_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            bm25_top_k: 50,
            vector_top_k: 50,
            rrf_k: 60,
            rerank_top_n: 10,
            fallback_expand_k: 100,
        }
    }
}

/// RQ component weights, gate thresholds, and confidence weights.
///
/// `rq_w_*` must sum to 1, as must `conf_alpha + conf_beta + conf_gamma`;
/// [`Settings::validate`] enforces both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub rq_fallback_threshold: f32,
    pub rq_proceed_threshold: f32,
    pub strict_rq_proceed_threshold: f32,

    pub rq_w_relevance: f32,
    pub rq_w_margin: f32,
    pub rq_w_coverage: f32,
    pub rq_w_consistency: f32,

    pub conf_alpha: f32,
    pub conf_beta: f32,
    pub conf_gamma: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            rq_fallback_threshold: 0.25,
            rq_proceed_threshold: 0.55,
            strict_rq_proceed_threshold: 0.70,
            rq_w_relevance: 0.45,
            rq_w_margin: 0.20,
            rq_w_coverage: 0.15,
            rq_w_consistency: 0.20,
            conf_alpha: 0.50,
            conf_beta: 0.35,
            conf_gamma: 0.15,
        }
    }
}

/// Verifier thresholds per mode, plus self-consistency gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    pub groundedness_pass_threshold: f32,
    pub groundedness_warn_threshold: f32,
    pub contradiction_pass_threshold: f32,
    pub contradiction_warn_threshold: f32,

    pub strict_groundedness_pass_threshold: f32,
    pub strict_contradiction_pass_threshold: f32,

    /// Self-consistency only runs when at least this much budget remains
    pub self_consistency_min_budget_ms: u64,
    pub self_consistency_temperature: f32,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            groundedness_pass_threshold: 0.70,
            groundedness_warn_threshold: 0.50,
            contradiction_pass_threshold: 0.20,
            contradiction_warn_threshold: 0.40,
            strict_groundedness_pass_threshold: 0.85,
            strict_contradiction_pass_threshold: 0.10,
            self_consistency_min_budget_ms: 1500,
            self_consistency_temperature: 0.1,
        }
    }
}

/// Chunking and chunk-quality parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap_pct: f32,
    /// Chunks shorter than this many characters are dropped at ingest
    pub min_chunk_chars: usize,
    /// Chunks where one token exceeds this share of all tokens are dropped
    pub max_repetition_ratio: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            overlap_pct: 0.15,
            min_chunk_chars: 20,
            max_repetition_ratio: 0.5,
        }
    }
}

/// Filesystem locations of stores and index snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub doc_db_path: String,
    pub trace_db_path: String,
    pub embedding_cache_db_path: String,
    pub vector_index_path: String,
    pub bm25_index_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            doc_db_path: "data/relia.db".to_string(),
            trace_db_path: "data/traces.db".to_string(),
            embedding_cache_db_path: "data/embedding_cache.db".to_string(),
            vector_index_path: "data/vector_index.json".to_string(),
            bm25_index_path: "data/bm25_index.json".to_string(),
        }
    }
}

/// Root settings tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub llm: LlmProviderConfig,
    pub embedding: EmbeddingProviderConfig,
    pub retrieval: RetrievalConfig,
    pub scoring: ScoringConfig,
    pub verification: VerificationConfig,
    pub chunking: ChunkingConfig,
    pub storage: StorageConfig,
}

impl Settings {
    /// RQ proceed threshold for the given mode.
    pub fn rq_proceed_threshold(&self, mode: QueryMode) -> f32 {
        match mode {
            QueryMode::Normal => self.scoring.rq_proceed_threshold,
            QueryMode::Strict => self.scoring.strict_rq_proceed_threshold,
        }
    }

    /// Groundedness pass threshold for the given mode.
    pub fn groundedness_pass_threshold(&self, mode: QueryMode) -> f32 {
        match mode {
            QueryMode::Normal => self.verification.groundedness_pass_threshold,
            QueryMode::Strict => self.verification.strict_groundedness_pass_threshold,
        }
    }

    /// Contradiction pass threshold for the given mode.
    pub fn contradiction_pass_threshold(&self, mode: QueryMode) -> f32 {
        match mode {
            QueryMode::Normal => self.verification.contradiction_pass_threshold,
            QueryMode::Strict => self.verification.strict_contradiction_pass_threshold,
        }
    }

    /// Check the weight-sum invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rq_sum = self.scoring.rq_w_relevance
            + self.scoring.rq_w_margin
            + self.scoring.rq_w_coverage
            + self.scoring.rq_w_consistency;
        if (rq_sum - 1.0).abs() > 1e-4 {
            return Err(ConfigError::InvalidValue {
                field: "scoring.rq_w_*".to_string(),
                message: format!("weights must sum to 1.0, got {rq_sum}"),
            });
        }

        let conf_sum = self.scoring.conf_alpha + self.scoring.conf_beta + self.scoring.conf_gamma;
        if (conf_sum - 1.0).abs() > 1e-4 {
            return Err(ConfigError::InvalidValue {
                field: "scoring.conf_*".to_string(),
                message: format!("weights must sum to 1.0, got {conf_sum}"),
            });
        }

        if self.scoring.rq_fallback_threshold > self.scoring.rq_proceed_threshold {
            return Err(ConfigError::InvalidValue {
                field: "scoring.rq_fallback_threshold".to_string(),
                message: "fallback threshold must not exceed proceed threshold".to_string(),
            });
        }

        Ok(())
    }
}

/// Load settings: defaults, then an optional TOML file, then `RELIA__*` env.
///
/// `RELIA__SERVER__PORT=9000` overrides `settings.server.port`.
pub fn load_settings(file: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder().add_source(Config::try_from(&Settings::default())?);

    if let Some(path) = file {
        builder = builder.add_source(File::with_name(path));
    }

    let settings: Settings = builder
        .add_source(
            Environment::with_prefix("RELIA")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?
        .try_deserialize()?;

    settings.validate()?;
    tracing::debug!(port = settings.server.port, "settings loaded");
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.retrieval.bm25_top_k, 50);
        assert_eq!(settings.scoring.rq_proceed_threshold, 0.55);
        assert_eq!(settings.verification.groundedness_pass_threshold, 0.70);
    }

    #[test]
    fn test_mode_thresholds() {
        let settings = Settings::default();
        assert_eq!(settings.rq_proceed_threshold(QueryMode::Normal), 0.55);
        assert_eq!(settings.rq_proceed_threshold(QueryMode::Strict), 0.70);
        assert_eq!(settings.groundedness_pass_threshold(QueryMode::Strict), 0.85);
        assert_eq!(settings.contradiction_pass_threshold(QueryMode::Strict), 0.10);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let mut settings = Settings::default();
        settings.scoring.rq_w_relevance = 0.9;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relia.toml");
        std::fs::write(&path, "[server]\nport = 9100\n").unwrap();

        let settings = load_settings(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(settings.server.port, 9100);
        // Untouched sections keep their defaults.
        assert_eq!(settings.retrieval.rrf_k, 60);
    }
}
