use std::sync::Arc;

use serde_json::{Map, Value};
use vigil_model::ModelGateway;
use vigil_telemetry::AuditContext;

use crate::error::RetrievalError;
use crate::index::{IndexItem, VectorIndex};

/// One policy/statute document to ingest (spec.md §4.5). `text` is the
/// full document body; chunking and chunk-id assignment happen here,
/// not at the caller.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub source_id: String,
    pub source_name: String,
    pub doc_uri: String,
    pub text: String,
    pub metadata: Map<String, Value>,
}

/// Splits document text into fixed-size, deterministic chunks. Given
/// the same input and the same `chunk_chars`, the same chunks (and
/// therefore the same `chunk_id`s, assigned by position) are produced
/// every time: the chunker has no randomness and no dependency on
/// ingestion order.
fn chunk_text(text: &str, chunk_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    chars
        .chunks(chunk_chars.max(1))
        .map(|slice| slice.iter().collect::<String>().trim().to_string())
        .filter(|chunk| !chunk.is_empty())
        .collect()
}

/// Idempotent ingestion job (spec.md §4.5): chunks each document,
/// embeds the chunks via the model gateway, and upserts them into the
/// vector index. Re-running with the same documents replaces existing
/// `{source_id, chunk_index}` pairs in place rather than duplicating
/// them, because [`crate::index::InMemoryVectorIndex::upsert`] keys on
/// that pair.
pub struct KnowledgeIndexBootstrap {
    index: Arc<dyn VectorIndex>,
    gateway: Arc<ModelGateway>,
    chunk_chars: usize,
}

impl KnowledgeIndexBootstrap {
    pub fn new(index: Arc<dyn VectorIndex>, gateway: Arc<ModelGateway>) -> Self {
        Self { index, gateway, chunk_chars: 1000 }
    }

    pub fn with_chunk_size(mut self, chunk_chars: usize) -> Self {
        self.chunk_chars = chunk_chars;
        self
    }

    pub async fn ingest(
        &self,
        documents: Vec<SourceDocument>,
        audit: &AuditContext,
    ) -> Result<usize, RetrievalError> {
        let mut items = Vec::new();
        for doc in documents {
            let chunks = chunk_text(&doc.text, self.chunk_chars);
            if chunks.is_empty() {
                continue;
            }
            let embeddings = self
                .gateway
                .embed(chunks.clone(), None, audit)
                .await
                .map_err(|err| RetrievalError::RetrievalUnavailableError(err.to_string()))?;
            for (chunk_index, (text, embedding)) in chunks.into_iter().zip(embeddings).enumerate() {
                items.push(IndexItem {
                    source_id: doc.source_id.clone(),
                    source_name: doc.source_name.clone(),
                    doc_uri: doc.doc_uri.clone(),
                    chunk_index: chunk_index as u32,
                    text,
                    embedding,
                    metadata: doc.metadata.clone(),
                });
            }
        }
        let count = items.len();
        self.index.upsert(items).await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryVectorIndex;
    use vigil_core::Config;
    use vigil_model::MockLlm;
    use vigil_telemetry::StdoutSink;

    fn audit() -> AuditContext {
        AuditContext::create(true, "wf", None, None, Arc::new(StdoutSink::new()))
    }

    fn doc(source_id: &str, text: &str) -> SourceDocument {
        SourceDocument {
            source_id: source_id.to_string(),
            source_name: format!("Source {source_id}"),
            doc_uri: format!("doc://{source_id}"),
            text: text.to_string(),
            metadata: Map::new(),
        }
    }

    fn bootstrap() -> KnowledgeIndexBootstrap {
        let index = Arc::new(InMemoryVectorIndex::new());
        let gateway = Arc::new(ModelGateway::new(Arc::new(MockLlm::new("unused")), &Config::for_tests()));
        KnowledgeIndexBootstrap::new(index, gateway).with_chunk_size(10)
    }

    #[tokio::test]
    async fn ingest_is_idempotent_across_reruns() {
        let b = bootstrap();
        let docs = vec![doc("statute-1", "a policy statement that spans multiple chunks of text")];
        let first = b.ingest(docs.clone(), &audit()).await.unwrap();
        let second = b.ingest(docs, &audit()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn empty_document_produces_no_chunks() {
        let b = bootstrap();
        let count = b.ingest(vec![doc("empty", "")], &audit()).await.unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn chunker_is_deterministic_for_same_input() {
        let text = "the quick brown fox jumps over the lazy dog repeatedly";
        assert_eq!(chunk_text(text, 10), chunk_text(text, 10));
    }
}
