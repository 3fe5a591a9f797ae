//! JSON-lines vector store, one serialized document per line.
//!
//! Append on add, full scan on search. This is the flat-file end of the
//! persistence spectrum; anything richer belongs behind the same trait in
//! the embedding application.

use async_trait::async_trait;
use neurite_core::error::RetrievalError;
use neurite_core::retrieval::{Document, VectorStore};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::similarity::rank_documents;

pub struct FileVectorStore {
    path: PathBuf,
}

impl FileVectorStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn load(&self) -> Result<Vec<Document>, RetrievalError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RetrievalError::Store(e.to_string())),
        };

        let mut documents = Vec::new();
        for line in raw.lines().filter(|line| !line.trim().is_empty()) {
            let document: Document = serde_json::from_str(line)
                .map_err(|e| RetrievalError::Store(format!("corrupt store line: {e}")))?;
            documents.push(document);
        }
        Ok(documents)
    }
}

#[async_trait]
impl VectorStore for FileVectorStore {
    async fn add_documents(&self, documents: Vec<Document>) -> Result<(), RetrievalError> {
        let mut lines = String::new();
        for document in &documents {
            let line = serde_json::to_string(document)
                .map_err(|e| RetrievalError::Store(e.to_string()))?;
            lines.push_str(&line);
            lines.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| RetrievalError::Store(e.to_string()))?;
        file.write_all(lines.as_bytes())
            .await
            .map_err(|e| RetrievalError::Store(e.to_string()))?;

        debug!(count = documents.len(), path = %self.path.display(), "Appended documents");
        Ok(())
    }

    async fn similarity_search(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<Document>, RetrievalError> {
        let documents = self.load().await?;
        Ok(rank_documents(&documents, embedding, k))
    }
}
