//! OpenAI-compatible chat-completions client
//!
//! Targets Ollama's `/v1` endpoint by default; any server implementing
//! `POST /chat/completions` and `GET /models` works.

use super::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, ProviderConfig,
    ProviderError, StreamChunk, StreamReceiver, Usage,
};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

pub struct OpenAIProvider {
    client: Client,
    config: ProviderConfig,
}

impl OpenAIProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Other(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// JSON body for `/chat/completions`.
    ///
    /// Fields serialize in declaration order, so equal requests produce
    /// identical bytes.
    pub fn request_body<'a>(&'a self, request: &'a CompletionRequest, stream: bool) -> ChatBody<'a> {
        ChatBody {
            model: request.model.as_deref().unwrap_or(self.config.model.as_str()),
            messages: &request.messages,
            temperature: request.temperature,
            stream,
        }
    }

    fn with_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.config.api_key.as_deref() {
            Some(key) if !key.is_empty() => builder.bearer_auth(key),
            _ => builder,
        }
    }

    async fn send_chat(&self, body: &ChatBody<'_>) -> Result<Response, ProviderError> {
        let response = self
            .with_auth(self.client.post(self.url("/chat/completions")))
            .json(body)
            .send()
            .await?;
        self.ensure_success(response, body.model).await
    }

    async fn ensure_success(&self, response: Response, model: &str) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            401 | 403 => ProviderError::Unauthorized,
            // Ollama: 404 {"error":"model \"x\" not found, try pulling it first"}
            404 if body.contains("model") => ProviderError::ModelNotFound(model.to_string()),
            code => ProviderError::Status { code, body },
        })
    }
}

impl LlmProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let response = self.with_auth(self.client.get(self.url("/models"))).send().await?;
        let response = self.ensure_success(response, &self.config.model).await?;
        let listing: ModelList = response.json().await?;

        Ok(listing.data.into_iter().map(|m| m.id).collect())
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let body = self.request_body(&request, false);
        tracing::debug!(model = body.model, prompt_chars = request.prompt_chars(), "chat completion");

        let reply: ChatReply = self.send_chat(&body).await?.json().await?;
        let Some(choice) = reply.choices.into_iter().next() else {
            return Err(ProviderError::Parse("response has no choices".into()));
        };

        let usage = reply
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();
        let finish_reason = FinishReason::parse(choice.finish_reason.as_deref());
        if finish_reason == FinishReason::Length {
            tracing::warn!("completion hit the token limit");
        }
        tracing::debug!(completion_tokens = usage.completion_tokens, ?finish_reason, "completion received");

        Ok(CompletionResponse {
            model: reply.model,
            content: choice.message.content,
            finish_reason,
            usage,
        })
    }

    async fn stream(&self, request: CompletionRequest) -> Result<StreamReceiver, ProviderError> {
        let body = self.request_body(&request, true);
        tracing::debug!(model = body.model, "opening completion stream");
        let response = self.send_chat(&body).await?;

        // Server-sent events, separated by a blank line
        let stream = async_stream::stream! {
            use futures_util::StreamExt;

            let mut bytes = response.bytes_stream();
            let mut events = SseBuffer::default();

            while let Some(next) = bytes.next().await {
                let data = match next {
                    Ok(data) => data,
                    Err(e) => {
                        yield StreamChunk::Error(e.to_string());
                        return;
                    }
                };
                events.extend(&data);

                while let Some(event) = events.next_event() {
                    for chunk in parse_sse_event(&event) {
                        let finished = matches!(chunk, StreamChunk::Done { .. });
                        yield chunk;
                        if finished {
                            return;
                        }
                    }
                }
            }
        };

        Ok(StreamReceiver::new(stream))
    }
}

/// Raw SSE bytes split into complete events.
///
/// Network reads can end inside a multibyte character, so bytes are only
/// decoded once the blank line closing their event has arrived.
#[derive(Debug, Default)]
struct SseBuffer {
    pending: Vec<u8>,
}

impl SseBuffer {
    fn extend(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    fn next_event(&mut self) -> Option<String> {
        let end = self.pending.windows(2).position(|w| w == b"\n\n")?;
        let event: Vec<u8> = self.pending.drain(..end + 2).collect();
        Some(String::from_utf8_lossy(&event).into_owned())
    }
}

/// Chunks carried by one SSE event
fn parse_sse_event(event: &str) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();

    for data in event.lines().filter_map(|line| line.strip_prefix("data:")) {
        let data = data.trim();
        if data == "[DONE]" {
            chunks.push(StreamChunk::Done { finish_reason: FinishReason::Stop });
            break;
        }

        let delta: StreamDelta = match serde_json::from_str(data) {
            Ok(delta) => delta,
            Err(e) => {
                tracing::warn!("skipping malformed stream event: {}", e);
                continue;
            }
        };
        let Some(choice) = delta.choices.into_iter().next() else {
            continue;
        };
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            chunks.push(StreamChunk::Text(text));
        }
        if let Some(reason) = choice.finish_reason {
            chunks.push(StreamChunk::Done {
                finish_reason: FinishReason::parse(Some(&reason)),
            });
        }
    }

    chunks
}

// Wire types

#[derive(Debug, Serialize)]
pub struct ChatBody<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    model: String,
    choices: Vec<ReplyChoice>,
    usage: Option<ReplyUsage>,
}

#[derive(Debug, Deserialize)]
struct ReplyChoice {
    message: ReplyMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    choices: Vec<DeltaChoice>,
}

#[derive(Debug, Deserialize)]
struct DeltaChoice {
    delta: ReplyMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}
