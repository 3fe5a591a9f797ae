//! Error types for the neurite domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all neurite operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Retrieval errors ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The tool-resume chain exceeded the configured depth limit.
    #[error("Tool resume depth limit reached after {depth} rounds")]
    ResumeDepthExceeded { depth: u32 },

    /// A chat, stream, or RAG operation failed. Wraps the original failure
    /// so its message and cause chain stay reachable.
    #[error("Agent operation failed: {message}")]
    Orchestration {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap a failure that escaped a chat/stream/RAG operation.
    pub fn orchestration(source: Error) -> Self {
        Self::Orchestration {
            message: source.to_string(),
            source: Box::new(source),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Could not decode provider response: {0}")]
    Decode(String),

    #[error("Could not map message to provider format: {0}")]
    Mapping(String),

    #[error("Provider '{0}' does not support streaming")]
    StreamingUnsupported(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    Store(String),
}
