//! Streaming variant of the chat orchestrator.
//!
//! Control flow mirrors `Agent::chat`, but the provider yields a lazy chunk
//! sequence and the caller consumes one continuous output stream. Tool-call
//! resumes are driven by an explicit work loop inside a spawned task rather
//! than call-stack recursion, so the resume chain is depth-bounded and the
//! splice is invisible to the caller.

use neurite_core::error::Error;
use neurite_core::event::AgentEvent;
use neurite_core::message::{ChatMessage, Message, Usage};
use neurite_core::provider::StreamChunk;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::agent::Agent;

/// One unit of agent stream output.
///
/// Final assistant messages are captured into history, not re-emitted here.
#[derive(Debug, Clone)]
pub enum StreamOutput {
    /// In-band provider status report, passed through untouched.
    Status(serde_json::Value),
    /// Raw text delta.
    Delta(String),
}

impl Agent {
    /// Drive one full turn, yielding output as it arrives.
    ///
    /// Failures surface on the stream as a single [`Error::Orchestration`]
    /// item after an `Error` event, mirroring [`Agent::chat`].
    pub fn stream(&self, messages: Vec<Message>) -> ReceiverStream<Result<StreamOutput, Error>> {
        let (tx, rx) = mpsc::channel(32);
        let agent = self.clone();

        tokio::spawn(async move {
            agent.event_bus().publish(&AgentEvent::StreamStart);

            match agent.run_stream(messages, &tx).await {
                Ok(()) => agent.event_bus().publish(&AgentEvent::StreamStop),
                Err(error) => {
                    warn!(error = %error, "Stream operation failed");
                    agent.event_bus().publish(&AgentEvent::Error {
                        message: error.to_string(),
                    });
                    let _ = tx.send(Err(Error::orchestration(error))).await;
                }
            }
        });

        ReceiverStream::new(rx)
    }

    async fn run_stream(
        &self,
        messages: Vec<Message>,
        tx: &mpsc::Sender<Result<StreamOutput, Error>>,
    ) -> Result<(), Error> {
        self.fill_history(messages);

        let mut depth = 0u32;

        // Each round streams one provider leg. A tool-call chunk ends the
        // leg and queues a resume round; a plain ending persists the reply.
        loop {
            let request = self.build_request();
            let mut chunks = self.provider().stream(request).await?;

            let mut content = String::new();
            let mut usage = Usage::default();
            let mut completed: Option<ChatMessage> = None;
            let mut pending_tools = None;

            while let Some(chunk) = chunks.recv().await {
                match chunk? {
                    StreamChunk::Status(status) => {
                        if tx.send(Ok(StreamOutput::Status(status))).await.is_err() {
                            return Ok(()); // caller hung up
                        }
                    }
                    StreamChunk::Delta(delta) => {
                        content.push_str(&delta);
                        if tx.send(Ok(StreamOutput::Delta(delta))).await.is_err() {
                            return Ok(());
                        }
                    }
                    StreamChunk::Usage(chunk_usage) => usage.add(&chunk_usage),
                    StreamChunk::Completed(message) => completed = Some(message),
                    StreamChunk::ToolCall(message) => pending_tools = Some(message),
                }
            }

            if let Some(tool_call) = pending_tools {
                depth += 1;
                if depth > self.config().max_resume_depth {
                    warn!(depth, "Tool resume depth limit reached");
                    return Err(Error::ResumeDepthExceeded { depth });
                }

                let result = self.execute_tools(&tool_call).await?;
                self.fill_history(vec![
                    Message::ToolCall(tool_call),
                    Message::ToolResult(result),
                ]);
                continue;
            }

            // No fully-formed message from the adapter: infer one from the
            // accumulated deltas and fold in the accumulated usage.
            let reply = completed.unwrap_or_else(|| {
                debug!(
                    chars = content.len(),
                    "Synthesizing assistant message from streamed deltas"
                );
                let mut message = ChatMessage::assistant(std::mem::take(&mut content));
                message.set_usage(usage);
                message
            });

            self.persist_reply(&reply);
            return Ok(());
        }
    }
}
