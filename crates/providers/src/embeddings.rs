//! Embeddings client for OpenAI-compatible `/embeddings` endpoints.

use async_trait::async_trait;
use neurite_core::error::RetrievalError;
use neurite_core::retrieval::Embedder;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// An [`Embedder`] backed by an OpenAI-compatible embeddings endpoint.
pub struct OpenAiEmbeddings {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiEmbeddings {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        }
    }

    /// OpenAI with the given model (e.g., "text-embedding-3-small").
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new("https://api.openai.com/v1", api_key, model)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbeddings {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let url = format!("{}/embeddings", self.base_url);

        let body = json!({
            "model": self.model,
            "input": [text],
            "encoding_format": "float",
        });

        debug!(model = %self.model, chars = text.len(), "Sending embedding request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Embedding(format!(
                "embeddings request failed with status {status}: {error_body}"
            )));
        }

        let api_response: EmbeddingApiResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Embedding(format!("failed to parse response: {e}")))?;

        api_response
            .data
            .into_iter()
            .next()
            .map(|entry| entry.embedding)
            .ok_or_else(|| RetrievalError::Embedding("no embedding in response".into()))
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_embedding_response() {
        let data = r#"{
            "data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}],
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 8, "total_tokens": 8}
        }"#;
        let parsed: EmbeddingApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.data[0].embedding, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let embedder = OpenAiEmbeddings::new("http://localhost:8080/v1/", "k", "m");
        assert_eq!(embedder.base_url, "http://localhost:8080/v1");
    }
}
