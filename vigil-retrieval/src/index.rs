use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::RetrievalError;

/// One document chunk to upsert (spec.md §4.5, §6). `source_id` is a
/// stable, caller-supplied document id; `chunk_index` is the
/// deterministic position of this chunk within that document.
#[derive(Debug, Clone)]
pub struct IndexItem {
    pub source_id: String,
    pub source_name: String,
    pub doc_uri: String,
    pub chunk_index: u32,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: Map<String, Value>,
}

/// One hit returned by [`VectorIndex::query`] (spec.md §6): `{id,
/// distance, document, metadata}`, expanded here into the identity
/// pieces the service needs to build a `Citation` without re-parsing
/// an opaque id. `distance` is the index's native similarity metric;
/// the service (not the index) normalizes it to a `[0.0, 1.0]` score
/// where `1.0` is most similar.
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub source_id: String,
    pub source_name: String,
    pub doc_uri: String,
    pub chunk_index: u32,
    pub distance: f32,
    pub document: String,
    pub metadata: Map<String, Value>,
}

impl IndexHit {
    /// `chunk_id ← source_id + deterministic chunk index` (spec.md §4.4).
    pub fn chunk_id(&self) -> String {
        format!("{}#{}", self.source_id, self.chunk_index)
    }
}

/// Narrows a query to a subset of the index (spec.md §4.4's
/// `search_subset`, e.g. "statutes only"). `id` participates in the
/// retrieval cache key, so two logically equivalent filters must share
/// an `id` to share a cache entry.
#[derive(Clone)]
pub struct SubsetFilter {
    pub id: String,
    pub predicate: Arc<dyn Fn(&Map<String, Value>) -> bool + Send + Sync>,
}

impl SubsetFilter {
    pub fn new(
        id: impl Into<String>,
        predicate: impl Fn(&Map<String, Value>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self { id: id.into(), predicate: Arc::new(predicate) }
    }

    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        (self.predicate)(metadata)
    }
}

impl std::fmt::Debug for SubsetFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubsetFilter").field("id", &self.id).finish_non_exhaustive()
    }
}

/// The vector store abstraction (spec.md §6). Implementations are
/// assumed thread-/task-safe; the service adds no locking of its own
/// around calls into this trait (spec.md §5).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, items: Vec<IndexItem>) -> Result<(), RetrievalError>;

    async fn query(
        &self,
        embedding: Vec<f32>,
        n_results: usize,
        filter: Option<&SubsetFilter>,
    ) -> Result<Vec<IndexHit>, RetrievalError>;
}

/// An in-memory brute-force index: cosine similarity over every stored
/// vector. Sufficient for tests and for a development deployment with
/// a small knowledge base; not a production ANN index.
pub struct InMemoryVectorIndex {
    items: std::sync::Mutex<Vec<IndexItem>>,
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self { items: std::sync::Mutex::new(Vec::new()) }
    }
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 1.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a < 1e-9 || norm_b < 1e-9 {
        return 1.0;
    }
    let cosine_similarity = (dot / (norm_a * norm_b)).clamp(-1.0, 1.0);
    1.0 - cosine_similarity
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, new_items: Vec<IndexItem>) -> Result<(), RetrievalError> {
        let mut items = self.items.lock().unwrap_or_else(|p| p.into_inner());
        for item in new_items {
            if let Some(existing) = items
                .iter_mut()
                .find(|i| i.source_id == item.source_id && i.chunk_index == item.chunk_index)
            {
                *existing = item;
            } else {
                items.push(item);
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        embedding: Vec<f32>,
        n_results: usize,
        filter: Option<&SubsetFilter>,
    ) -> Result<Vec<IndexHit>, RetrievalError> {
        let items = self.items.lock().unwrap_or_else(|p| p.into_inner());
        let mut hits: Vec<IndexHit> = items
            .iter()
            .filter(|item| filter.map(|f| f.matches(&item.metadata)).unwrap_or(true))
            .map(|item| IndexHit {
                source_id: item.source_id.clone(),
                source_name: item.source_name.clone(),
                doc_uri: item.doc_uri.clone(),
                chunk_index: item.chunk_index,
                distance: cosine_distance(&embedding, &item.embedding),
                document: item.text.clone(),
                metadata: item.metadata.clone(),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(n_results);
        Ok(hits)
    }
}
