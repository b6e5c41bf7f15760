//! LLM Client implementations
//!
//! Provides abstraction for OpenAI and Ollama LLM APIs
//! with support for both synchronous and streaming responses.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use docsum_core::{DocsumError, LlmClient, LlmConfig, LlmProvider, Prompt, Result};
use eventsource_stream::Eventsource;
use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

fn request_error(err: reqwest::Error) -> DocsumError {
    if err.is_timeout() {
        DocsumError::GenerationTimeout(0)
    } else {
        DocsumError::Generation(format!("Request failed: {err}"))
    }
}

/// Content deltas of an OpenAI server-sent event stream
fn sse_deltas<S, E>(bytes: S) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    bytes
        .eventsource()
        .filter_map(|event| async move {
            let event = match event {
                Ok(event) => event,
                Err(e) => return Some(Err(DocsumError::Generation(format!("Stream error: {e}")))),
            };
            if event.data == "[DONE]" {
                return None;
            }
            let parsed: StreamResponse = serde_json::from_str(&event.data).ok()?;
            let content = parsed.choices.into_iter().next()?.delta.content?;
            (!content.is_empty()).then_some(Ok(content))
        })
        .boxed()
}

/// Newline-delimited lines of a byte stream; the last line may lack a newline
fn json_lines<S, E>(bytes: S) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let reader = StreamReader::new(bytes.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
    FramedRead::new(reader, LinesCodec::new())
        .map_err(|e| DocsumError::Generation(format!("Stream error: {e}")))
        .boxed()
}

// ============================================================================
// OpenAI Client
// ============================================================================

/// OpenAI API client
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

impl OpenAiClient {
    /// Create a new OpenAI client
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: model.into(),
            max_tokens,
            temperature,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| DocsumError::Config("OpenAI API key required".to_string()))?;

        let client = Self::new(
            api_key.clone(),
            config.model.clone(),
            config.max_tokens,
            config.temperature,
        );
        Ok(match &config.openai_base_url {
            Some(url) => client.with_base_url(url.clone()),
            None => client,
        })
    }

    /// Set custom base URL (for Azure or compatible APIs)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn request<'a>(&'a self, prompt: &'a Prompt, stream: bool) -> OpenAiRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if !prompt.system.is_empty() {
            messages.push(Message {
                role: "system",
                content: &prompt.system,
            });
        }
        messages.push(Message {
            role: "user",
            content: &prompt.user,
        });

        OpenAiRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: stream.then_some(true),
        }
    }

    async fn send(&self, request: &OpenAiRequest<'_>) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(DocsumError::Generation(format!(
                "OpenAI error ({status}): {error_text}"
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let response = self.send(&self.request(prompt, false)).await?;

        let result: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| DocsumError::Generation(format!("Failed to parse response: {e}")))?;

        tracing::debug!(model = %self.model, prompt_chars = prompt.char_count(), "OpenAI completion received");

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| DocsumError::Generation("No response generated".to_string()))
    }

    async fn generate_stream(&self, prompt: &Prompt) -> Result<BoxStream<'static, Result<String>>> {
        let response = self.send(&self.request(prompt, true)).await?;
        Ok(sse_deltas(response.bytes_stream()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Ollama Client
// ============================================================================

/// Ollama API client
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    options: OllamaOptions,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    stream: bool,
    options: &'a OllamaOptions,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            options: OllamaOptions {
                temperature: 0.0,
                num_predict: 1024,
            },
        }
    }

    /// Sampling temperature and output token limit
    pub fn with_options(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.options = OllamaOptions {
            temperature,
            num_predict: max_tokens,
        };
        self
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(config.ollama_url.clone(), config.model.clone())
            .with_options(config.temperature, config.max_tokens)
    }

    async fn send(&self, prompt: &Prompt, stream: bool) -> Result<reqwest::Response> {
        let request = OllamaRequest {
            model: &self.model,
            prompt: &prompt.user,
            system: &prompt.system,
            stream,
            options: &self.options,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(DocsumError::Generation(format!(
                "Ollama error ({status}): {error_text}"
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let response = self.send(prompt, false).await?;

        let result: OllamaResponse = response.json().await.map_err(|e| {
            DocsumError::Generation(format!("Failed to parse Ollama response: {e}"))
        })?;

        tracing::debug!(model = %self.model, prompt_chars = prompt.char_count(), "Ollama completion received");
        Ok(result.response)
    }

    async fn generate_stream(&self, prompt: &Prompt) -> Result<BoxStream<'static, Result<String>>> {
        let response = self.send(prompt, true).await?;

        // Ollama streams JSON objects, one per line
        let mapped_stream = json_lines(response.bytes_stream()).filter_map(|line| async move {
            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            };
            let parsed: OllamaResponse = serde_json::from_str(&line).ok()?;
            (!parsed.response.is_empty()).then_some(Ok(parsed.response))
        });

        Ok(Box::pin(mapped_stream))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an LLM client from config
pub fn create_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let client: Arc<dyn LlmClient> = match config.provider {
        LlmProvider::OpenAI | LlmProvider::Azure => Arc::new(OpenAiClient::from_config(config)?),
        LlmProvider::Ollama => Arc::new(OllamaClient::from_config(config)),
    };
    tracing::info!(provider = ?config.provider, model = %config.model, "LLM client ready");
    Ok(client)
}

// ============================================================================
// Tests
// ============================================================================
