//! Agent configuration.

use neurite_core::error::Error;
use serde::{Deserialize, Serialize};

/// Configuration for one agent's behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model to request from the provider (e.g., "gpt-4o")
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Maximum tool-resume rounds per chat/stream operation (safety limit
    /// against adversarial tool-call loops)
    #[serde(default = "default_max_resume_depth")]
    pub max_resume_depth: u32,

    /// Default number of documents requested by the RAG pipeline
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_max_resume_depth() -> u32 {
    8
}
fn default_top_k() -> usize {
    4
}

impl AgentConfig {
    /// Config for `model` with every other field at its default.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: default_temperature(),
            max_tokens: None,
            max_resume_depth: default_max_resume_depth(),
            top_k: default_top_k(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_max_resume_depth(mut self, max_resume_depth: u32) -> Self {
        self.max_resume_depth = max_resume_depth;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Parse a config from TOML.
    pub fn from_toml_str(raw: &str) -> Result<Self, Error> {
        toml::from_str(raw).map_err(|e| Error::Config {
            message: e.to_string(),
        })
    }
}
