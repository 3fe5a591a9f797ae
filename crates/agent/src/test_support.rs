//! Shared test helpers: scripted providers, stub tools, recording observers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use neurite_core::error::{ProviderError, RetrievalError, ToolError};
use neurite_core::event::{AgentEvent, EventKind, Observer};
use neurite_core::message::{Message, ToolCall};
use neurite_core::provider::{Provider, ProviderRequest, StreamChunk};
use neurite_core::retrieval::Embedder;
use neurite_core::tool::Tool;

use crate::agent::Agent;

/// A provider that returns a queue of scripted replies, one per `chat` call.
/// Panics when the queue runs dry. Streaming is deliberately not overridden.
pub(crate) struct ScriptedProvider {
    replies: Mutex<VecDeque<Message>>,
    error: Option<ProviderError>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Message>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            error: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose every call fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            error: Some(error),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// The requests captured so far, for assertions.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: ProviderRequest) -> Result<Message, ProviderError> {
        self.requests.lock().unwrap().push(request);

        if let Some(error) = &self.error {
            return Err(error.clone());
        }

        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedProvider: no scripted replies left"))
    }
}

/// A streaming provider scripted as legs of chunks; each `stream` call
/// plays the next leg.
pub(crate) struct ScriptedStreamProvider {
    legs: Mutex<VecDeque<Vec<Result<StreamChunk, ProviderError>>>>,
}

impl ScriptedStreamProvider {
    pub fn new(legs: Vec<Vec<StreamChunk>>) -> Self {
        Self::new_with_results(
            legs.into_iter()
                .map(|leg| leg.into_iter().map(Ok).collect())
                .collect(),
        )
    }

    pub fn new_with_results(legs: Vec<Vec<Result<StreamChunk, ProviderError>>>) -> Self {
        Self {
            legs: Mutex::new(legs.into()),
        }
    }
}

#[async_trait]
impl Provider for ScriptedStreamProvider {
    fn name(&self) -> &str {
        "scripted-stream"
    }

    async fn chat(&self, _request: ProviderRequest) -> Result<Message, ProviderError> {
        panic!("ScriptedStreamProvider is streaming-only");
    }

    async fn stream(
        &self,
        _request: ProviderRequest,
    ) -> Result<
        tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let leg = self
            .legs
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedStreamProvider: no scripted legs left");

        let (tx, rx) = tokio::sync::mpsc::channel(leg.len().max(1));
        tokio::spawn(async move {
            for chunk in leg {
                if tx.send(chunk).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

/// Records the kind of every event it sees, in order.
pub(crate) struct EventRecorder {
    kinds: Mutex<Vec<EventKind>>,
}

impl EventRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            kinds: Mutex::new(Vec::new()),
        })
    }

    /// Create a recorder already wildcard-subscribed to `agent`.
    pub fn subscribe_all(agent: &Agent) -> Arc<Self> {
        let recorder = Self::new();
        agent.observe(recorder.clone(), None);
        recorder
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.kinds.lock().unwrap().clone()
    }
}

impl Observer for EventRecorder {
    fn update(&self, event: &AgentEvent) {
        self.kinds.lock().unwrap().push(event.kind());
    }
}

/// Echoes its "text" argument back as the tool result.
#[derive(Default)]
pub(crate) struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes back the text argument"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": { "type": "string" }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        Ok(arguments["text"].as_str().unwrap_or_default().to_string())
    }
}

/// An embedder that returns the same vector for every input.
pub(crate) struct FixedEmbedder {
    embedding: Vec<f32>,
}

impl FixedEmbedder {
    pub fn new(embedding: Vec<f32>) -> Self {
        Self { embedding }
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed_text(&self, _text: &str) -> Result<Vec<f32>, RetrievalError> {
        Ok(self.embedding.clone())
    }
}

/// An embedder that always fails.
pub(crate) struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed_text(&self, _text: &str) -> Result<Vec<f32>, RetrievalError> {
        Err(RetrievalError::Embedding("embedder offline".into()))
    }
}

pub(crate) fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.into(),
        name: name.into(),
        arguments,
    }
}
