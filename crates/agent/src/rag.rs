//! Retrieval-augmented generation.
//!
//! Wraps an [`Agent`] with an embedder, a vector store, and a post-processor
//! chain. Before delegating to chat, the question is embedded, similar
//! documents are fetched and deduplicated, the post-processors run, and the
//! agent's instructions are rebuilt with the retrieved context appended.

use std::sync::Arc;

use neurite_core::error::Error;
use neurite_core::event::{AgentEvent, EventKind, Observer};
use neurite_core::message::{ChatMessage, Message};
use neurite_core::retrieval::{Document, DocumentPostProcessor, Embedder, VectorStore};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::agent::Agent;
use crate::stream::StreamOutput;

const CONTEXT_HEADER: &str = "# EXTRA INFORMATION AND CONTEXT";

/// A retrieval-augmented agent.
pub struct Rag {
    agent: Agent,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    post_processors: Vec<Box<dyn DocumentPostProcessor>>,
}

impl Rag {
    pub fn new(agent: Agent, embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            agent,
            embedder,
            store,
            post_processors: Vec::new(),
        }
    }

    /// Install the post-processor chain, applied in order after search.
    pub fn with_post_processors(
        mut self,
        post_processors: Vec<Box<dyn DocumentPostProcessor>>,
    ) -> Self {
        self.post_processors = post_processors;
        self
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Register an observer for lifecycle events (`None` = every event).
    pub fn observe(&self, observer: Arc<dyn Observer>, kind: Option<EventKind>) -> &Self {
        self.agent.observe(observer, kind);
        self
    }

    /// Answer a question with retrieved context, using the configured
    /// default `top_k`.
    pub async fn answer(&self, question: ChatMessage) -> Result<ChatMessage, Error> {
        self.answer_k(question, self.agent.config().top_k).await
    }

    /// Answer a question with the `k` most relevant documents injected.
    pub async fn answer_k(&self, question: ChatMessage, k: usize) -> Result<ChatMessage, Error> {
        let events = self.agent.event_bus();
        events.publish(&AgentEvent::RagStart);

        self.retrieval(&question, k).await?;
        let reply = self.agent.chat(vec![Message::Chat(question)]).await?;

        events.publish(&AgentEvent::RagStop);
        Ok(reply)
    }

    /// Streaming variant of [`Rag::answer`].
    pub async fn stream_answer(
        &self,
        question: ChatMessage,
    ) -> Result<ReceiverStream<Result<StreamOutput, Error>>, Error> {
        self.stream_answer_k(question, self.agent.config().top_k)
            .await
    }

    /// Streaming variant of [`Rag::answer_k`]. `RagStop` is published once
    /// the inner stream drains.
    pub async fn stream_answer_k(
        &self,
        question: ChatMessage,
        k: usize,
    ) -> Result<ReceiverStream<Result<StreamOutput, Error>>, Error> {
        let events = self.agent.event_bus();
        events.publish(&AgentEvent::RagStart);

        self.retrieval(&question, k).await?;
        let mut inner = self.agent.stream(vec![Message::Chat(question)]);

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            while let Some(item) = inner.next().await {
                if tx.send(item).await.is_err() {
                    return;
                }
            }
            events.publish(&AgentEvent::RagStop);
        });

        Ok(ReceiverStream::new(rx))
    }

    /// The retrieval sub-steps, always in this order: embed, search, dedup,
    /// post-process, rebuild instructions.
    async fn retrieval(&self, question: &ChatMessage, k: usize) -> Result<(), Error> {
        let events = self.agent.event_bus();
        let query = question.text().to_string();

        events.publish(&AgentEvent::VectorStoreSearching {
            query: query.clone(),
        });

        let documents = self.search_documents(&query, k).await?;
        let documents = self.apply_post_processors(&query, documents);

        info!(hits = documents.len(), k, "Retrieval complete");
        events.publish(&AgentEvent::VectorStoreResult {
            query,
            documents: documents.clone(),
        });

        let previous = self.agent.instructions();
        events.publish(&AgentEvent::InstructionsChanging {
            instructions: previous.clone(),
        });

        let current = augment_instructions(&previous, &documents, k);
        self.agent.set_instructions(current.clone());

        events.publish(&AgentEvent::InstructionsChanged { previous, current });
        Ok(())
    }

    async fn search_documents(&self, question: &str, k: usize) -> Result<Vec<Document>, Error> {
        let embedding = self.embedder.embed_text(question).await?;
        let documents = self.store.similarity_search(&embedding, k).await?;
        Ok(dedup_by_content(documents))
    }

    fn apply_post_processors(&self, question: &str, documents: Vec<Document>) -> Vec<Document> {
        self.post_processors
            .iter()
            .fold(documents, |documents, processor| {
                processor.process(question, documents)
            })
    }
}

/// Collapse equal-content documents: the last occurrence wins, at the
/// position of the first.
fn dedup_by_content(documents: Vec<Document>) -> Vec<Document> {
    let mut keyed: Vec<([u8; 32], Document)> = Vec::new();

    for document in documents {
        let digest = document.content_digest();
        match keyed.iter_mut().find(|(key, _)| *key == digest) {
            Some((_, slot)) => *slot = document,
            None => keyed.push((digest, document)),
        }
    }

    if !keyed.is_empty() {
        debug!(unique = keyed.len(), "Deduplicated retrieved documents");
    }
    keyed.into_iter().map(|(_, document)| document).collect()
}

/// Append the retrieved context under a fixed header. `k` is re-applied
/// here: if dedup or post-processing changed the count, this truncation is
/// the effective limit.
fn augment_instructions(instructions: &str, documents: &[Document], k: usize) -> String {
    let mut context = String::new();
    for document in documents.iter().take(k) {
        context.push_str(&document.content);
        context.push(' ');
    }

    format!("{instructions}\n\n{CONTEXT_HEADER}\n{context}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::test_support::*;
    use neurite_core::message::Role;
    use neurite_retrieval::InMemoryVectorStore;

    fn embedded(content: &str, embedding: Vec<f32>) -> Document {
        let mut document = Document::new(content);
        document.embedding = Some(embedding);
        document
    }

    async fn seeded_store(documents: Vec<Document>) -> Arc<InMemoryVectorStore> {
        let store = Arc::new(InMemoryVectorStore::new());
        store.add_documents(documents).await.unwrap();
        store
    }

    #[test]
    fn dedup_keeps_last_instance_at_first_position() {
        let mut first_a = Document::new("A");
        first_a.source_name = "early".into();
        let mut last_a = Document::new("A");
        last_a.source_name = "late".into();

        let deduped = dedup_by_content(vec![first_a, Document::new("B"), last_a]);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].content, "A");
        assert_eq!(deduped[0].source_name, "late");
        assert_eq!(deduped[1].content, "B");
    }

    #[test]
    fn context_takes_first_k_space_joined() {
        let documents = vec![
            Document::new("x"),
            Document::new("y"),
            Document::new("z"),
        ];
        let augmented = augment_instructions("Base.", &documents, 2);

        assert_eq!(
            augmented,
            "Base.\n\n# EXTRA INFORMATION AND CONTEXT\nx y "
        );
        assert!(!augmented.contains('z'));
    }

    #[tokio::test]
    async fn answer_injects_retrieved_context() {
        let provider = Arc::new(ScriptedProvider::new(vec![Message::assistant(
            "Grounded answer.",
        )]));
        let agent = Agent::new(provider.clone(), AgentConfig::new("mock-model").with_top_k(2))
            .with_instructions("You answer questions.");

        let store = seeded_store(vec![
            embedded("rust is fast", vec![1.0, 0.0]),
            embedded("rust is safe", vec![0.9, 0.1]),
            embedded("unrelated", vec![0.0, 1.0]),
        ])
        .await;

        let rag = Rag::new(agent, Arc::new(FixedEmbedder::new(vec![1.0, 0.0])), store);
        let reply = rag.answer(ChatMessage::user("tell me about rust")).await.unwrap();
        assert_eq!(reply.text(), "Grounded answer.");

        let instructions = provider.requests()[0].instructions.clone().unwrap();
        assert!(instructions.starts_with("You answer questions."));
        assert!(instructions.contains("# EXTRA INFORMATION AND CONTEXT"));
        assert!(instructions.contains("rust is fast rust is safe "));
        assert!(!instructions.contains("unrelated"));
    }

    #[tokio::test]
    async fn answer_publishes_rag_events_in_order() {
        let provider = Arc::new(ScriptedProvider::new(vec![Message::assistant("ok")]));
        let agent = Agent::new(provider, AgentConfig::new("mock-model"));
        let store = seeded_store(vec![embedded("doc", vec![1.0])]).await;

        let rag = Rag::new(agent, Arc::new(FixedEmbedder::new(vec![1.0])), store);
        let recorder = EventRecorder::new();
        rag.observe(recorder.clone(), None);

        rag.answer(ChatMessage::user("q")).await.unwrap();

        let kinds = recorder.kinds();
        let position = |kind: EventKind| kinds.iter().position(|k| *k == kind).unwrap();

        assert_eq!(kinds.first(), Some(&EventKind::RagStart));
        assert_eq!(kinds.last(), Some(&EventKind::RagStop));
        assert!(position(EventKind::VectorStoreSearching) < position(EventKind::VectorStoreResult));
        assert!(position(EventKind::VectorStoreResult) < position(EventKind::InstructionsChanging));
        assert!(position(EventKind::InstructionsChanging) < position(EventKind::InstructionsChanged));
        assert!(position(EventKind::InstructionsChanged) < position(EventKind::ChatStart));
    }

    #[tokio::test]
    async fn post_processors_run_in_order_over_the_full_set() {
        struct Reverser;
        impl DocumentPostProcessor for Reverser {
            fn process(&self, _question: &str, mut documents: Vec<Document>) -> Vec<Document> {
                documents.reverse();
                documents
            }
        }

        struct KeepFirst;
        impl DocumentPostProcessor for KeepFirst {
            fn process(&self, _question: &str, mut documents: Vec<Document>) -> Vec<Document> {
                documents.truncate(1);
                documents
            }
        }

        let provider = Arc::new(ScriptedProvider::new(vec![Message::assistant("ok")]));
        let agent = Agent::new(provider.clone(), AgentConfig::new("mock-model").with_top_k(3));
        let store = seeded_store(vec![
            embedded("first", vec![1.0, 0.0]),
            embedded("second", vec![0.8, 0.2]),
        ])
        .await;

        let rag = Rag::new(agent, Arc::new(FixedEmbedder::new(vec![1.0, 0.0])), store)
            .with_post_processors(vec![Box::new(Reverser), Box::new(KeepFirst)]);

        rag.answer(ChatMessage::user("q")).await.unwrap();

        // Reversed then truncated: only the previously-last document stays.
        let instructions = provider.requests()[0].instructions.clone().unwrap();
        assert!(instructions.contains("second "));
        assert!(!instructions.contains("first"));
    }

    #[tokio::test]
    async fn stream_answer_streams_then_publishes_rag_stop() {
        let provider = Arc::new(ScriptedStreamProvider::new(vec![vec![
            neurite_core::provider::StreamChunk::Delta("str".into()),
            neurite_core::provider::StreamChunk::Delta("eamed".into()),
        ]]));
        let agent = Agent::new(provider, AgentConfig::new("mock-model"));
        let store = seeded_store(vec![embedded("doc", vec![1.0])]).await;

        let rag = Rag::new(agent, Arc::new(FixedEmbedder::new(vec![1.0])), store);
        let recorder = EventRecorder::new();
        rag.observe(recorder.clone(), None);

        let mut stream = rag.stream_answer(ChatMessage::user("q")).await.unwrap();
        let mut text = String::new();
        while let Some(item) = stream.next().await {
            if let StreamOutput::Delta(delta) = item.unwrap() {
                text.push_str(&delta);
            }
        }
        assert_eq!(text, "streamed");

        // Give the forwarding task a beat to publish RagStop after drain.
        tokio::task::yield_now().await;
        let kinds = recorder.kinds();
        assert_eq!(kinds.last(), Some(&EventKind::RagStop));

        let history = rag.agent().history_snapshot();
        let Message::Chat(reply) = history.last().unwrap() else {
            panic!("Expected chat message");
        };
        assert_eq!(reply.role(), Role::Assistant);
        assert_eq!(reply.text(), "streamed");
    }

    #[tokio::test]
    async fn embedding_failure_propagates() {
        let provider = Arc::new(ScriptedProvider::new(vec![Message::assistant("unused")]));
        let agent = Agent::new(provider, AgentConfig::new("mock-model"));
        let store = seeded_store(vec![]).await;

        let rag = Rag::new(agent, Arc::new(FailingEmbedder), store);
        let err = rag.answer(ChatMessage::user("q")).await.unwrap_err();
        assert!(matches!(err, Error::Retrieval(_)));
    }
}
