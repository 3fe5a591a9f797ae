//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM, and any endpoint exposing
//! an OpenAI-compatible `/v1/chat/completions` surface.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Tool use / function calling
//! - Citation annotations (`url_citation`) on assistant replies

use async_trait::async_trait;
use futures::StreamExt;
use neurite_core::error::ProviderError;
use neurite_core::message::{
    Annotation, ChatMessage, Content, Message, Role, ToolCall, ToolCallMessage, Usage,
};
use neurite_core::provider::{Provider, ProviderRequest, StreamChunk};
use neurite_core::tool::ToolDefinition;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, trace, warn};

use crate::mapper::MessageMapper;

/// An OpenAI-compatible LLM provider.
pub struct OpenAiProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Create a provider for any OpenAI-compatible endpoint.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    fn build_body(&self, request: &ProviderRequest, stream: bool) -> Result<Value, ProviderError> {
        // A fresh mapper per request: the mapper accumulates internally and
        // must not be shared across overlapping calls.
        let mut mapper = MessageMapper::new();

        let mut messages: Vec<Value> = Vec::new();
        if let Some(instructions) = &request.instructions {
            messages.push(json!({"role": Role::System.as_str(), "content": instructions}));
        }
        messages.extend(mapper.map(&request.messages)?);

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "stream": stream,
        });

        if stream {
            body["stream_options"] = json!({ "include_usage": true });
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = json!(to_api_tools(&request.tools));
        }

        Ok(body)
    }

    async fn post(
        &self,
        body: &Value,
        accept: &str,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", accept)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: ProviderRequest) -> Result<Message, ProviderError> {
        let body = self.build_body(&request, false)?;

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self.post(&body, "application/json").await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(format!("Failed to parse response: {e}")))?;

        decode_response(api_response)
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<
        tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let body = self.build_body(&request, true)?;

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self.post(&body, "text/event-stream").await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        // Read the SSE byte stream and translate frames into chunks.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut tool_calls = ToolCallAssembler::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete lines
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    // Skip empty lines and SSE comments
                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let data = data.trim();

                    // "[DONE]" signals end of stream
                    if data == "[DONE]" {
                        if let Some(message) = tool_calls.finish() {
                            let _ = tx.send(Ok(StreamChunk::ToolCall(message))).await;
                        }
                        return;
                    }

                    let value: Value = match serde_json::from_str(data) {
                        Ok(value) => value,
                        Err(e) => {
                            trace!(
                                provider = %provider_name,
                                data = %data,
                                error = %e,
                                "Ignoring unparseable SSE frame"
                            );
                            continue;
                        }
                    };

                    // Platform progress reports (hosted web search and the
                    // like) pass through untouched.
                    if value.get("status").is_some() {
                        if tx.send(Ok(StreamChunk::Status(value))).await.is_err() {
                            return; // receiver dropped
                        }
                        continue;
                    }

                    let frame: StreamFrame = match serde_json::from_value(value) {
                        Ok(frame) => frame,
                        Err(e) => {
                            trace!(
                                provider = %provider_name,
                                error = %e,
                                "Ignoring SSE frame with unknown shape"
                            );
                            continue;
                        }
                    };

                    if let Some(choice) = frame.choices.first() {
                        if let Some(deltas) = &choice.delta.tool_calls {
                            tool_calls.absorb(deltas);
                        }

                        if let Some(content) = &choice.delta.content {
                            if !content.is_empty()
                                && tx
                                    .send(Ok(StreamChunk::Delta(content.clone())))
                                    .await
                                    .is_err()
                            {
                                return;
                            }
                        }
                    }

                    // Usage arrives in a trailing frame when
                    // stream_options.include_usage is set.
                    if let Some(usage) = frame.usage {
                        let _ = tx
                            .send(Ok(StreamChunk::Usage(Usage::new(
                                usage.prompt_tokens,
                                usage.completion_tokens,
                            ))))
                            .await;
                    }
                }
            }

            // Stream ended without [DONE]
            if let Some(message) = tool_calls.finish() {
                let _ = tx.send(Ok(StreamChunk::ToolCall(message))).await;
            }
        });

        Ok(rx)
    }
}

// --- Wire types (internal) ---

#[derive(Debug, Serialize)]
struct ApiToolDefinition<'a> {
    r#type: &'static str,
    function: &'a ToolDefinition,
}

fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition<'_>> {
    tools
        .iter()
        .map(|tool| ApiToolDefinition {
            r#type: "function",
            function: tool,
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    id: Option<String>,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default)]
    annotations: Option<Vec<ApiAnnotation>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiAnnotation {
    r#type: String,
    #[serde(default)]
    url_citation: Option<ApiUrlCitation>,
}

#[derive(Debug, Deserialize)]
struct ApiUrlCitation {
    url: String,
    title: String,
    #[serde(default)]
    start_index: Option<u32>,
    #[serde(default)]
    end_index: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

fn decode_response(api_response: ApiResponse) -> Result<Message, ProviderError> {
    let usage = api_response
        .usage
        .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens));

    let choice = api_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Decode("No choices in response".into()))?;

    let content = choice.message.content.map(Content::Text);

    if let Some(raw_calls) = choice.message.tool_calls.filter(|calls| !calls.is_empty()) {
        let calls = raw_calls.iter().map(domain_tool_call).collect();

        let mut message = ToolCallMessage::new(content, calls);
        message.add_metadata(
            "tool_calls",
            serde_json::to_value(&raw_calls)
                .map_err(|e| ProviderError::Decode(e.to_string()))?,
        );
        if let Some(usage) = usage {
            message.set_usage(usage);
        }
        return Ok(Message::ToolCall(message));
    }

    let mut message = ChatMessage::new(Role::Assistant, content);
    if let Some(id) = api_response.id {
        message.add_metadata("id", Value::String(id));
    }
    for annotation in choice.message.annotations.unwrap_or_default() {
        if annotation.r#type == "url_citation" {
            if let Some(citation) = annotation.url_citation {
                message.add_annotation(Annotation {
                    url: citation.url,
                    title: citation.title,
                    start_index: citation.start_index,
                    end_index: citation.end_index,
                });
            }
        }
    }
    if let Some(usage) = usage {
        message.set_usage(usage);
    }

    Ok(Message::Chat(message))
}

fn domain_tool_call(raw: &ApiToolCall) -> ToolCall {
    ToolCall {
        id: raw.id.clone(),
        name: raw.function.name.clone(),
        // Lenient parse: malformed argument JSON degrades to Null rather
        // than failing the whole response.
        arguments: serde_json::from_str(&raw.function.arguments).unwrap_or(Value::Null),
    }
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` frame from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamFrame {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta; arrives incrementally across frames.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Assembles incremental tool-call deltas into a complete request message.
struct ToolCallAssembler {
    // index → partially assembled call
    partial: Vec<(u32, ApiToolCall)>,
}

impl ToolCallAssembler {
    fn new() -> Self {
        Self {
            partial: Vec::new(),
        }
    }

    fn absorb(&mut self, deltas: &[StreamToolCallDelta]) {
        for delta in deltas {
            let pos = match self.partial.iter().position(|(i, _)| *i == delta.index) {
                Some(pos) => pos,
                None => {
                    self.partial.push((
                        delta.index,
                        ApiToolCall {
                            id: String::new(),
                            r#type: "function".into(),
                            function: ApiFunction {
                                name: String::new(),
                                arguments: String::new(),
                            },
                        },
                    ));
                    self.partial.len() - 1
                }
            };
            let slot = &mut self.partial[pos].1;

            if let Some(id) = &delta.id {
                slot.id = id.clone();
            }
            if let Some(function) = &delta.function {
                if let Some(name) = &function.name {
                    slot.function.name = name.clone();
                }
                if let Some(arguments) = &function.arguments {
                    slot.function.arguments.push_str(arguments);
                }
            }
        }
    }

    fn finish(&mut self) -> Option<ToolCallMessage> {
        if self.partial.is_empty() {
            return None;
        }

        self.partial.sort_by_key(|(index, _)| *index);
        let raw_calls: Vec<ApiToolCall> =
            self.partial.drain(..).map(|(_, call)| call).collect();
        let calls = raw_calls.iter().map(domain_tool_call).collect();

        let mut message = ToolCallMessage::new(None, calls);
        if let Ok(raw) = serde_json::to_value(&raw_calls) {
            message.add_metadata("tool_calls", raw);
        }
        Some(message)
    }
}
