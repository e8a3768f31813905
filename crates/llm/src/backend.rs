//! Chat-completions LLM backend.
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint (OpenAI,
//! Ollama, vLLM, llama.cpp server, ...).

use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use relia_core::traits::llm::FragmentStream;
use relia_core::{Error, GenerateRequest, LanguageModel, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Backend configuration.
#[derive(Debug, Clone)]
pub struct ChatBackendConfig {
    /// Base URL including any `/v1` suffix, e.g. `http://localhost:11434/v1`
    pub endpoint: String,
    /// Bearer token, if the endpoint requires one
    pub api_key: Option<String>,
    pub model: String,
    /// Request timeout
    pub timeout: Duration,
    /// Maximum retry attempts for transient failures
    pub max_retries: u32,
    /// Initial backoff duration (doubles each retry)
    pub initial_backoff: Duration,
}

impl Default for ChatBackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/v1".to_string(),
            api_key: None,
            model: "llama3.1:8b-instruct".to_string(),
            timeout: Duration::from_secs(60),
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
        }
    }
}

/// OpenAI-compatible chat backend.
#[derive(Clone)]
pub struct ChatBackend {
    client: Client,
    config: ChatBackendConfig,
}

impl ChatBackend {
    pub fn new(config: ChatBackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }

    fn build_messages(request: &GenerateRequest) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });
        messages
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn execute_request(&self, body: &ChatRequest) -> Result<ChatResponse> {
        let response = self
            .apply_auth(self.client.post(self.chat_url()).json(body))
            .send()
            .await
            .map_err(|e| classify_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(Error::Llm(format!("server error {status}: {detail}")));
            }
            return Err(Error::Llm(format!("API error {status}: {detail}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Llm(format!("invalid response: {e}")))
    }

    /// Transient failures worth retrying: connection problems, timeouts, 5xx.
    fn is_retryable(error: &Error) -> bool {
        match error {
            Error::Llm(msg) => {
                msg.starts_with("network error")
                    || msg.starts_with("timeout")
                    || msg.starts_with("server error")
            }
            _ => false,
        }
    }

    async fn generate_with_retry(&self, body: ChatRequest) -> Result<ChatResponse> {
        let mut last_error = None;
        let mut backoff = self.config.initial_backoff;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(
                    ?backoff,
                    attempt,
                    max = self.config.max_retries,
                    "LLM request failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.execute_request(&body).await {
                Ok(response) => return Ok(response),
                Err(e) if Self::is_retryable(&e) => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Llm("max retries exceeded".to_string())))
    }
}

fn classify_reqwest(e: &reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Llm(format!("timeout: {e}"))
    } else if e.is_connect() || e.is_request() {
        Error::Llm(format!("network error: {e}"))
    } else {
        Error::Llm(e.to_string())
    }
}

#[async_trait]
impl LanguageModel for ChatBackend {
    async fn generate(&self, request: GenerateRequest) -> Result<String> {
        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: Self::build_messages(&request),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
            response_format: None,
        };

        let response = self.generate_with_retry(body).await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Llm("empty choices in response".to_string()))
    }

    fn generate_stream(&self, request: GenerateRequest) -> FragmentStream<'_> {
        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: Self::build_messages(&request),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: true,
            response_format: None,
        };

        Box::pin(try_stream! {
            let response = self
                .apply_auth(self.client.post(self.chat_url()).json(&body))
                .send()
                .await
                .map_err(|e| classify_reqwest(&e))?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                Err(Error::Llm(format!("API error {status}: {detail}")))?;
                return;
            }

            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(bytes) = stream.next().await {
                let bytes = bytes.map_err(|e| classify_reqwest(&e))?;
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Providers send SSE frames, one JSON chunk per `data:` line.
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);

                    let payload = match line.strip_prefix("data:") {
                        Some(rest) => rest.trim(),
                        None => continue,
                    };
                    if payload.is_empty() || payload == "[DONE]" {
                        continue;
                    }
                    if let Ok(chunk) = serde_json::from_str::<ChatStreamChunk>(payload) {
                        if let Some(delta) = chunk
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.delta.content)
                        {
                            if !delta.is_empty() {
                                yield delta;
                            }
                        }
                    }
                }
            }
        })
    }

    async fn generate_structured(
        &self,
        request: GenerateRequest,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: Self::build_messages(&request),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
            response_format: Some(ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };

        let response = self.generate_with_retry(body).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Llm("empty choices in response".to_string()))?;

        let value: serde_json::Value = serde_json::from_str(content.trim())
            .map_err(|e| Error::Llm(format!("structured output is not JSON: {e}")))?;

        let validator = jsonschema::JSONSchema::compile(schema)
            .map_err(|e| Error::Configuration(format!("invalid output schema: {e}")))?;
        if !validator.is_valid(&value) {
            return Err(Error::Llm("structured output failed schema validation".to_string()));
        }

        Ok(value)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// OpenAI-compatible wire types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChunk {
    choices: Vec<ChatStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChoice {
    delta: ChatDelta,
}

#[derive(Debug, Deserialize)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ChatBackendConfig::default();
        assert_eq!(config.max_retries, 3);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_chat_url_trims_slash() {
        let backend = ChatBackend::new(ChatBackendConfig {
            endpoint: "http://localhost:8080/v1/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(backend.chat_url(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_build_messages_with_system() {
        let req = GenerateRequest::new("hello").with_system("be terse");
        let messages = ChatBackend::build_messages(&req);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content, "hello");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ChatBackend::is_retryable(&Error::Llm(
            "network error: connection refused".to_string()
        )));
        assert!(ChatBackend::is_retryable(&Error::Llm(
            "server error 503: overloaded".to_string()
        )));
        assert!(!ChatBackend::is_retryable(&Error::Llm(
            "API error 400: bad request".to_string()
        )));
        assert!(!ChatBackend::is_retryable(&Error::Embedding("x".to_string())));
    }

    #[test]
    fn test_stream_chunk_parse() {
        let payload = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        let chunk: ChatStreamChunk = serde_json::from_str(payload).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hel"));

        let terminal = r#"{"choices":[{"delta":{}}]}"#;
        let chunk: ChatStreamChunk = serde_json::from_str(terminal).unwrap();
        assert!(chunk.choices[0].delta.content.is_none());
    }
}
