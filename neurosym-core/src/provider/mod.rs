//! # LLM Provider Interface
//!
//! Both translation stages talk to the LLM collaborator through
//! `LlmProvider`. The pipeline is generic over it, so tests plug in a
//! scripted provider and the binary plugs in `OpenAIProvider`, which speaks
//! the chat-completions dialect exposed by Ollama, vLLM and llama.cpp.

pub mod openai;

pub use openai::OpenAIProvider;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::time::Duration;

/// Both prompts are complete instructions, so only user turns are sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One chat-completion call.
///
/// `model: None` means the provider's configured model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub stream: bool,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Characters across all messages, for logging
    pub fn prompt_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content.chars().count()).sum()
    }
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Model that actually answered, as reported by the server
    pub model: String,
    pub content: Option<String>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    /// Cut off by the token limit; the program is probably truncated
    Length,
    Unknown,
}

impl FinishReason {
    pub fn parse(reason: Option<&str>) -> Self {
        match reason {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            _ => FinishReason::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Text(String),
    Done { finish_reason: FinishReason },
    /// The connection broke mid-stream
    Error(String),
}

/// Transport-level failures talking to the LLM server
#[derive(Debug)]
pub enum ProviderError {
    /// Server unreachable or the connection dropped
    Network(String),
    Timeout,
    /// Non-success HTTP status not covered below
    Status { code: u16, body: String },
    /// Response body was not what the API promised
    Parse(String),
    /// The server doesn't serve the requested model
    ModelNotFound(String),
    Unauthorized,
    Other(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::Parse(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Network(e) => write!(f, "cannot reach LLM server: {}", e),
            ProviderError::Timeout => write!(f, "LLM server did not answer in time"),
            ProviderError::Status { code, body } => write!(f, "LLM server returned {}: {}", code, body),
            ProviderError::Parse(e) => write!(f, "unexpected LLM response: {}", e),
            ProviderError::ModelNotFound(model) => write!(f, "model '{}' is not installed", model),
            ProviderError::Unauthorized => write!(f, "LLM server rejected the API key"),
            ProviderError::Other(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ProviderError {}

/// The LLM collaborator
#[allow(async_fn_in_trait)]
pub trait LlmProvider {
    fn name(&self) -> &str;

    /// Model used when a request doesn't name one
    fn default_model(&self) -> &str;

    /// Models the server currently offers
    async fn list_models(&self) -> Result<Vec<String>, ProviderError>;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    async fn stream(&self, request: CompletionRequest) -> Result<StreamReceiver, ProviderError>;
}

/// Chunks of a streamed completion
pub struct StreamReceiver {
    inner: Pin<Box<dyn futures_core::Stream<Item = StreamChunk> + Send>>,
}

impl StreamReceiver {
    pub fn new<S>(stream: S) -> Self
    where
        S: futures_core::Stream<Item = StreamChunk> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    pub async fn next(&mut self) -> Option<StreamChunk> {
        use futures_util::StreamExt;
        self.inner.next().await
    }

    /// Drain the stream into one string, handing each fragment to `on_text`
    /// as it arrives. Anything after `Done` is ignored.
    pub async fn collect_text<F>(mut self, mut on_text: F) -> Result<String, ProviderError>
    where
        F: FnMut(&str),
    {
        let mut text = String::new();
        loop {
            match self.next().await {
                Some(StreamChunk::Text(fragment)) => {
                    on_text(&fragment);
                    text.push_str(&fragment);
                }
                Some(StreamChunk::Error(e)) => return Err(ProviderError::Network(e)),
                Some(StreamChunk::Done { .. }) | None => return Ok(text),
            }
        }
    }
}

/// Connection settings for an OpenAI-compatible server
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    /// e.g. `http://localhost:11434/v1` for Ollama
    pub base_url: String,
    pub model: String,
    /// Sent as a bearer token; local servers usually need none
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}
