//! LLM and embedding provider clients
//!
//! Features:
//! - Chat-completions backend for any OpenAI-compatible endpoint
//!   (generation, fragment streaming, schema-validated structured output)
//! - HTTP embedding client
//! - Deterministic hash embedder (lexical fallback, no network)
//! - Caching embedder wrapper over the content-addressed embedding cache

pub mod backend;
pub mod cached;
pub mod embedder;
pub mod hash_embedder;

pub use backend::{ChatBackend, ChatBackendConfig};
pub use cached::CachedEmbedder;
pub use embedder::{HttpEmbedder, HttpEmbedderConfig};
pub use hash_embedder::HashEmbedder;
