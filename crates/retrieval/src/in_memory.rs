//! Brute-force in-memory vector store for tests and ephemeral sessions.

use async_trait::async_trait;
use neurite_core::error::RetrievalError;
use neurite_core::retrieval::{Document, VectorStore};
use tokio::sync::RwLock;
use tracing::debug;

use crate::similarity::rank_documents;

/// A brute-force vector store over a `Vec<Document>`.
pub struct InMemoryVectorStore {
    documents: RwLock<Vec<Document>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add_documents(&self, documents: Vec<Document>) -> Result<(), RetrievalError> {
        self.documents.write().await.extend(documents);
        Ok(())
    }

    async fn similarity_search(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<Document>, RetrievalError> {
        let documents = self.documents.read().await;
        let hits = rank_documents(&documents, embedding, k);

        debug!(hits = hits.len(), k, "In-memory similarity search");
        Ok(hits)
    }
}
