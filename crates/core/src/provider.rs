//! The seam between the orchestrator and LLM backends.
//!
//! A Provider turns a conversation into a provider-native request and
//! decodes the reply back into domain messages, either as one complete
//! message or as a stream of chunks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::{ChatMessage, Message, ToolCallMessage, Usage};
use crate::tool::ToolDefinition;

/// One provider call: the full conversation plus everything resolved by the
/// orchestrator for this turn. System instructions travel out-of-band from
/// the message list; the mapper never sees system messages.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o")
    pub model: String,

    /// Resolved system instructions for this turn
    pub instructions: Option<String>,

    /// The conversation, oldest first
    pub messages: Vec<Message>,

    /// Tools the model may call
    pub tools: Vec<ToolDefinition>,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
}

/// One unit of a streamed response.
///
/// The set is closed: adapters normalize whatever their wire format emits
/// into these five shapes and the orchestrator interprets nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamChunk {
    /// In-band progress report (e.g. a hosted web-search step); passed
    /// through to the caller untouched.
    Status(serde_json::Value),

    /// Raw text delta; passed through and accumulated.
    Delta(String),

    /// Token counters; may arrive more than once and is folded by addition.
    Usage(Usage),

    /// A fully-formed assistant message. Captured, never re-emitted as text.
    Completed(ChatMessage),

    /// The model requested tool execution; triggers a resume round.
    ToolCall(ToolCallMessage),
}

/// The core Provider trait.
///
/// The orchestrator calls `chat` or `stream` without knowing which backend
/// is configured.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and wait for the complete reply: either a plain
    /// assistant message or a tool-call request.
    async fn chat(&self, request: ProviderRequest) -> Result<Message, ProviderError>;

    /// Send a request and receive the reply as a stream of chunks.
    ///
    /// The default implementation fails with
    /// [`ProviderError::StreamingUnsupported`] before any network I/O;
    /// backends that can stream override it.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<
        tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let _ = request;
        Err(ProviderError::StreamingUnsupported(self.name().to_string()))
    }
}
