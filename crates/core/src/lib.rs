//! # neurite core
//!
//! Domain types, traits, and error definitions for the neurite agent
//! framework. This crate defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod history;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, RetrievalError, ToolError};
pub use event::{AgentEvent, EventBus, EventKind, Observer};
pub use history::{ChatHistory, InMemoryChatHistory};
pub use message::{
    Annotation, ChatMessage, Content, Message, Role, ToolCall, ToolCallMessage,
    ToolCallResultMessage, ToolResult, Usage,
};
pub use provider::{Provider, ProviderRequest, StreamChunk};
pub use retrieval::{Document, DocumentPostProcessor, Embedder, VectorStore};
pub use tool::{Tool, ToolDefinition, ToolRegistry};
