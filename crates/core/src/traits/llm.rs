//! Language model capability.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::llm_types::GenerateRequest;
use crate::Result;

/// Stream of text fragments from an in-flight generation.
pub type FragmentStream<'a> = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>>;

/// Language model interface.
///
/// Implementations:
/// - `ChatBackend` - any OpenAI-compatible chat-completions endpoint
/// - test stubs with scripted responses
///
/// # Example
///
/// ```ignore
/// let llm: Arc<dyn LanguageModel> = Arc::new(ChatBackend::new(config)?);
/// let req = GenerateRequest::new("Summarize the evidence").with_temperature(0.1);
/// let text = llm.generate(req).await?;
/// ```
#[async_trait]
pub trait LanguageModel: Send + Sync + 'static {
    /// Generate a completion and return the full text.
    async fn generate(&self, request: GenerateRequest) -> Result<String>;

    /// Stream fragments as they are generated.
    ///
    /// Lower latency than [`LanguageModel::generate`]; fragments concatenate
    /// to the same text a non-streaming call would return.
    fn generate_stream(&self, request: GenerateRequest) -> FragmentStream<'_>;

    /// Generate output conforming to a JSON schema.
    ///
    /// Implementations should request structured output from the provider
    /// where supported and validate the result against `schema`. Callers are
    /// expected to recover from failure by parsing a plain
    /// [`LanguageModel::generate`] response themselves.
    async fn generate_structured(
        &self,
        request: GenerateRequest,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value>;

    /// Model identifier for logging.
    fn model_name(&self) -> &str;
}
