//! Chat history: the ordered, mutable log of a conversation.
//!
//! The trait is the seam for durable backends; the framework ships an
//! in-memory implementation with a token-estimate context window.

use crate::message::Message;

/// An ordered log of messages for one conversation.
///
/// Append-only apart from the context-window policy applied on insert.
pub trait ChatHistory: Send {
    /// Append a message, applying the backend's windowing policy.
    fn add_message(&mut self, message: Message);

    /// All messages, oldest first.
    fn messages(&self) -> &[Message];

    /// The most recently appended message.
    fn last_message(&self) -> Option<&Message> {
        self.messages().last()
    }

    /// Drop every message.
    fn clear(&mut self);
}

/// In-memory history with a context window measured in estimated tokens.
///
/// When the running estimate exceeds the window, the oldest messages are
/// dropped first. The most recent message is never dropped.
pub struct InMemoryChatHistory {
    messages: Vec<Message>,
    context_window: usize,
}

const DEFAULT_CONTEXT_WINDOW: usize = 50_000;

impl InMemoryChatHistory {
    pub fn new() -> Self {
        Self::with_context_window(DEFAULT_CONTEXT_WINDOW)
    }

    /// `context_window` is an estimated-token budget, not a message count.
    pub fn with_context_window(context_window: usize) -> Self {
        Self {
            messages: Vec::new(),
            context_window,
        }
    }

    fn estimated_tokens(&self) -> usize {
        self.messages.iter().map(Message::estimated_tokens).sum()
    }

    fn cut_to_context_window(&mut self) {
        let mut dropped = 0usize;
        while self.messages.len() > 1 && self.estimated_tokens() > self.context_window {
            self.messages.remove(0);
            dropped += 1;
        }
        if dropped > 0 {
            tracing::debug!(dropped, window = self.context_window, "History cut to context window");
        }
    }
}

impl Default for InMemoryChatHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatHistory for InMemoryChatHistory {
    fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.cut_to_context_window();
    }

    fn messages(&self) -> &[Message] {
        &self.messages
    }

    fn clear(&mut self) {
        self.messages.clear();
    }
}
