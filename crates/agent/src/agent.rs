//! The chat orchestrator.
//!
//! One `chat` call drives a full turn: fold the caller's messages into
//! history, submit the conversation to the provider, execute any requested
//! tools, resume until the provider settles on a plain assistant reply, and
//! persist that reply behind the duplicate-save guard. Lifecycle events are
//! published at every step.

use std::sync::{Arc, Mutex, RwLock};

use neurite_core::error::{Error, ProviderError};
use neurite_core::event::{AgentEvent, EventBus, EventKind, Observer};
use neurite_core::history::{ChatHistory, InMemoryChatHistory};
use neurite_core::message::{
    ChatMessage, Message, ToolCallMessage, ToolCallResultMessage, ToolResult,
};
use neurite_core::provider::{Provider, ProviderRequest};
use neurite_core::tool::ToolRegistry;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;

const DEFAULT_INSTRUCTIONS: &str = "You are a helpful and friendly AI agent.";

/// An agent: provider, tools, instructions, history, and event bus for one
/// conversation.
///
/// Cloning is cheap (the state is shared), but operations on one agent are
/// not synchronized against each other: concurrent calls interleave over
/// the same history and instructions. Callers serialize invocations on one
/// agent, or give each concurrent operation its own agent.
#[derive(Clone)]
pub struct Agent {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    history: Arc<Mutex<Box<dyn ChatHistory>>>,
    instructions: Arc<RwLock<String>>,
    events: Arc<EventBus>,
    config: AgentConfig,
}

impl Agent {
    pub fn new(provider: Arc<dyn Provider>, config: AgentConfig) -> Self {
        Self {
            provider,
            tools: Arc::new(ToolRegistry::new()),
            history: Arc::new(Mutex::new(Box::new(InMemoryChatHistory::new()))),
            instructions: Arc::new(RwLock::new(DEFAULT_INSTRUCTIONS.to_string())),
            events: Arc::new(EventBus::new()),
            config,
        }
    }

    /// Replace the system instructions.
    pub fn with_instructions(self, instructions: impl Into<String>) -> Self {
        self.set_instructions(instructions.into());
        self
    }

    /// Attach the tool set offered to the provider.
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    /// Swap the chat history backend.
    pub fn with_history(mut self, history: Box<dyn ChatHistory>) -> Self {
        self.history = Arc::new(Mutex::new(history));
        self
    }

    /// Register an observer for lifecycle events (`None` = every event).
    pub fn observe(&self, observer: Arc<dyn Observer>, kind: Option<EventKind>) -> &Self {
        self.events.subscribe(observer, kind);
        self
    }

    /// The current system instructions.
    pub fn instructions(&self) -> String {
        self.instructions
            .read()
            .expect("instructions poisoned")
            .clone()
    }

    pub fn set_instructions(&self, instructions: String) {
        *self.instructions.write().expect("instructions poisoned") = instructions;
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub(crate) fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Shared handle to this agent's event bus.
    pub fn event_bus(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// A snapshot of the conversation so far.
    pub fn history_snapshot(&self) -> Vec<Message> {
        self.history
            .lock()
            .expect("chat history poisoned")
            .messages()
            .to_vec()
    }

    /// Drive one full turn and wait for the final assistant reply.
    ///
    /// Any failure inside the operation is published as an `Error` event and
    /// re-raised wrapped in [`Error::Orchestration`].
    pub async fn chat(&self, messages: Vec<Message>) -> Result<ChatMessage, Error> {
        self.events.publish(&AgentEvent::ChatStart);

        match self.run_chat(messages).await {
            Ok(reply) => {
                self.events.publish(&AgentEvent::ChatStop);
                Ok(reply)
            }
            Err(error) => {
                self.events.publish(&AgentEvent::Error {
                    message: error.to_string(),
                });
                Err(Error::orchestration(error))
            }
        }
    }

    async fn run_chat(&self, messages: Vec<Message>) -> Result<ChatMessage, Error> {
        self.fill_history(messages);

        info!(
            model = %self.config.model,
            history = self.history.lock().expect("chat history poisoned").messages().len(),
            "Processing chat turn"
        );

        let mut depth = 0u32;

        loop {
            let request = self.build_request();
            let reply = self.provider.chat(request).await?;

            match reply {
                Message::ToolCall(tool_call) => {
                    depth += 1;
                    if depth > self.config.max_resume_depth {
                        warn!(depth, "Tool resume depth limit reached");
                        return Err(Error::ResumeDepthExceeded { depth });
                    }

                    debug!(
                        round = depth,
                        calls = tool_call.calls().len(),
                        "Provider requested tool execution"
                    );

                    let result = self.execute_tools(&tool_call).await?;
                    self.fill_history(vec![
                        Message::ToolCall(tool_call),
                        Message::ToolResult(result),
                    ]);
                    // Resume: the provider sees the results and decides next.
                }
                Message::Chat(reply) => {
                    self.persist_reply(&reply);
                    return Ok(reply);
                }
                Message::ToolResult(_) => {
                    return Err(Error::Provider(ProviderError::Decode(
                        "provider replied with a tool result message".into(),
                    )));
                }
            }
        }
    }

    /// Execute a requested tool batch, strictly in order.
    ///
    /// A failing tool aborts the batch immediately: no partial results, no
    /// retry. The produced result message carries exactly one entry per
    /// request.
    pub(crate) async fn execute_tools(
        &self,
        message: &ToolCallMessage,
    ) -> Result<ToolCallResultMessage, Error> {
        let mut results = Vec::with_capacity(message.calls().len());

        for call in message.calls() {
            self.events.publish(&AgentEvent::ToolCalling(call.clone()));

            let content = match self.tools.execute(call).await {
                Ok(content) => content,
                Err(error) => {
                    warn!(tool = %call.name, error = %error, "Tool execution failed");
                    self.events.publish(&AgentEvent::Error {
                        message: error.to_string(),
                    });
                    return Err(error.into());
                }
            };

            let result = ToolResult {
                call: call.clone(),
                content,
            };
            self.events.publish(&AgentEvent::ToolCalled(result.clone()));
            results.push(result);
        }

        Ok(ToolCallResultMessage::new(results))
    }

    pub(crate) fn build_request(&self) -> ProviderRequest {
        ProviderRequest {
            model: self.config.model.clone(),
            instructions: Some(self.instructions()),
            messages: self.history_snapshot(),
            tools: self.tools.definitions(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    pub(crate) fn fill_history(&self, messages: Vec<Message>) {
        let mut history = self.history.lock().expect("chat history poisoned");
        for message in messages {
            history.add_message(message);
        }
    }

    /// Append the final reply unless the history already ends with a message
    /// of the same role, which guards resumed operations against saving the
    /// reply twice.
    pub(crate) fn persist_reply(&self, reply: &ChatMessage) {
        let duplicate = {
            let history = self.history.lock().expect("chat history poisoned");
            history
                .last_message()
                .map(|last| last.role() == reply.role())
                .unwrap_or(false)
        };

        if duplicate {
            debug!("Skipping save: history already ends with a same-role message");
            return;
        }

        let message = Message::Chat(reply.clone());
        self.events
            .publish(&AgentEvent::MessageSaving(message.clone()));
        self.history
            .lock()
            .expect("chat history poisoned")
            .add_message(message.clone());
        self.events.publish(&AgentEvent::MessageSaved(message));
    }
}
