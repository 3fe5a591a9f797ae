//! Retrieval traits and the document unit they operate on.
//!
//! The RAG pipeline embeds a question, searches a vector store, and runs the
//! hits through a post-processor chain. Store and embedder implementations
//! live in their own crates; this module defines the seams.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RetrievalError;

/// A retrieval unit: one chunk of source material, optionally embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// The chunk text injected into instructions when retrieved.
    pub content: String,

    /// Kind of origin ("manual", "file", "url", ...).
    pub source_type: String,

    /// Identifier of the origin within its kind.
    pub source_name: String,

    /// Position of this chunk within its source.
    pub chunk_number: u32,

    /// Embedding vector, when computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Similarity score set by search operations.
    #[serde(default)]
    pub score: f32,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source_type: "manual".into(),
            source_name: "manual".into(),
            chunk_number: 0,
            embedding: None,
            score: 0.0,
        }
    }

    /// Identity for deduplication: the SHA-256 of the content.
    pub fn content_digest(&self) -> [u8; 32] {
        Sha256::digest(self.content.as_bytes()).into()
    }
}

/// Turns text into an embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;
}

/// Similarity search over embedded documents.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Add documents to the store. Documents without embeddings are
    /// accepted; they are simply unreachable by similarity search.
    async fn add_documents(&self, documents: Vec<Document>) -> Result<(), RetrievalError>;

    /// The `k` documents most similar to `embedding`, best first, with
    /// scores populated.
    async fn similarity_search(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<Document>, RetrievalError>;
}

/// A step in the retrieval post-processing chain.
///
/// Each processor receives the full document set and returns the full set;
/// it may reorder, filter, or rewrite.
pub trait DocumentPostProcessor: Send + Sync {
    fn process(&self, question: &str, documents: Vec<Document>) -> Vec<Document>;
}
