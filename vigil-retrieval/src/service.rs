use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use vigil_core::{AuditOperation, Citation, Config, RetrievalResult};
use vigil_model::ModelGateway;
use vigil_telemetry::AuditContext;

use crate::cache::{CacheKey, RetrievalCache};
use crate::error::RetrievalError;
use crate::index::{IndexHit, SubsetFilter, VectorIndex};

const STRATEGY: &str = "vector";

/// Singleton wrapper over a vector index (spec.md §4.4). Owns no
/// per-request state: the cache and the index handle are the only
/// mutable state, both process-wide.
pub struct RetrievalService {
    index: Arc<dyn VectorIndex>,
    gateway: Arc<ModelGateway>,
    cache: Option<RetrievalCache>,
    default_top_k: usize,
}

impl RetrievalService {
    pub fn new(index: Arc<dyn VectorIndex>, gateway: Arc<ModelGateway>, config: &Config) -> Self {
        let cache = config
            .flags
            .retrieval_cache_enabled
            .then(|| RetrievalCache::new(256, Duration::from_secs(config.retrieval_cache_ttl_s)));
        Self { index, gateway, cache, default_top_k: config.default_top_k }
    }

    pub async fn search(
        &self,
        query: &str,
        n_results: Option<usize>,
        similarity_threshold: Option<f64>,
        audit: &AuditContext,
    ) -> Result<RetrievalResult, RetrievalError> {
        self.search_subset(query, None, n_results, similarity_threshold, audit).await
    }

    pub async fn search_subset(
        &self,
        query: &str,
        subset_predicate: Option<&SubsetFilter>,
        n_results: Option<usize>,
        similarity_threshold: Option<f64>,
        audit: &AuditContext,
    ) -> Result<RetrievalResult, RetrievalError> {
        if query.trim().is_empty() {
            let event_start = Instant::now();
            audit.record(
                AuditOperation::Retrieval,
                false,
                event_start.elapsed().as_secs_f64() * 1000.0,
                [("query_length", json!(0)), ("strategy", json!(STRATEGY))],
            );
            return Err(RetrievalError::RetrievalInvalidQuery("query must not be empty".into()));
        }

        let n = n_results.unwrap_or(self.default_top_k);
        let cache_key = CacheKey::new(query, n, similarity_threshold, subset_predicate.map(|f| f.id.as_str()));

        if let Some(cache) = &self.cache {
            if let Some(mut cached) = cache.get(&cache_key) {
                cached.cache_hit = true;
                audit.record(
                    AuditOperation::Retrieval,
                    true,
                    0.0,
                    [
                        ("query_length", json!(query.chars().count())),
                        ("n_results", json!(n)),
                        ("strategy", json!(STRATEGY)),
                        ("cache_hit", json!(true)),
                    ],
                );
                return Ok(cached);
            }
        }

        let start = Instant::now();
        let embed_result = self.gateway.embed(vec![query.to_string()], None, audit).await;
        let hits: Result<Vec<IndexHit>, RetrievalError> = match embed_result {
            Ok(vectors) => {
                let embedding = vectors.into_iter().next().unwrap_or_default();
                self.index.query(embedding, n, subset_predicate).await
            }
            Err(err) => Err(RetrievalError::RetrievalUnavailableError(err.to_string())),
        };
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        match hits {
            Ok(hits) => {
                let citations = citations_from_hits(hits, similarity_threshold);
                let result = RetrievalResult {
                    citations,
                    raw_hits: Vec::new(),
                    query_length: query.chars().count(),
                    n_results: n,
                    strategy: STRATEGY.to_string(),
                    cache_hit: false,
                    latency_ms,
                };
                if let Some(cache) = &self.cache {
                    cache.put(cache_key, result.clone());
                }
                audit.record(
                    AuditOperation::Retrieval,
                    true,
                    latency_ms,
                    [
                        ("query_length", json!(result.query_length)),
                        ("n_results", json!(n)),
                        ("strategy", json!(STRATEGY)),
                        ("cache_hit", json!(false)),
                    ],
                );
                Ok(result)
            }
            Err(err) => {
                audit.record(
                    AuditOperation::Retrieval,
                    false,
                    latency_ms,
                    [
                        ("query_length", json!(query.chars().count())),
                        ("n_results", json!(n)),
                        ("strategy", json!(STRATEGY)),
                        ("cache_hit", json!(false)),
                    ],
                );
                Err(err)
            }
        }
    }
}

/// Citation construction from index hits (spec.md §4.4): maps id,
/// chunk, snippet, and normalizes distance to a `[0.0, 1.0]` score
/// where `1.0` is most similar. Ordering: descending score, ties
/// broken by ascending `(source_id, chunk_id)`.
fn citations_from_hits(hits: Vec<IndexHit>, similarity_threshold: Option<f64>) -> Vec<Citation> {
    let mut citations: Vec<Citation> = hits
        .into_iter()
        .filter_map(|hit| {
            let score = (1.0 - hit.distance as f64).clamp(0.0, 1.0);
            if let Some(threshold) = similarity_threshold {
                if score < threshold {
                    return None;
                }
            }
            let chunk_id = hit.chunk_id();
            Citation::new(hit.source_id, hit.source_name, hit.doc_uri, chunk_id, hit.document, score, hit.metadata)
                .ok()
        })
        .collect();

    citations.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.source_id.cmp(&b.source_id))
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    citations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexItem, InMemoryVectorIndex};
    use serde_json::Map;
    use vigil_model::MockLlm;
    use vigil_telemetry::StdoutSink;

    fn audit() -> AuditContext {
        AuditContext::create(true, "wf", None, None, Arc::new(StdoutSink::new()))
    }

    fn item(source_id: &str, chunk: u32, embedding: Vec<f32>, text: &str) -> IndexItem {
        IndexItem {
            source_id: source_id.to_string(),
            source_name: format!("Source {source_id}"),
            doc_uri: format!("doc://{source_id}"),
            chunk_index: chunk,
            text: text.to_string(),
            embedding,
            metadata: Map::new(),
        }
    }

    fn service(index: Arc<dyn VectorIndex>, cache_enabled: bool) -> RetrievalService {
        let gateway = Arc::new(ModelGateway::new(Arc::new(MockLlm::new("unused")), &Config::for_tests()));
        let mut config = Config::for_tests();
        config.flags.retrieval_cache_enabled = cache_enabled;
        RetrievalService::new(index, gateway, &config)
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let index = Arc::new(InMemoryVectorIndex::new());
        let svc = service(index, false);
        let result = svc.search("   ", None, None, &audit()).await;
        assert!(matches!(result, Err(RetrievalError::RetrievalInvalidQuery(_))));
    }

    #[tokio::test]
    async fn zero_hits_returns_empty_result_not_error() {
        let index = Arc::new(InMemoryVectorIndex::new());
        let svc = service(index, false);
        let result = svc.search("anything", None, None, &audit()).await.unwrap();
        assert!(result.citations.is_empty());
    }

    #[tokio::test]
    async fn ordering_breaks_ties_by_source_then_chunk() {
        // Mirrors spec.md §8 scenario 6 at the citation-construction layer:
        // equal scores order by ascending (source_id, chunk_id).
        let hits = vec![
            IndexHit {
                source_id: "A".into(),
                source_name: "A".into(),
                doc_uri: "doc://a".into(),
                chunk_index: 2,
                distance: 0.2,
                document: "a2".into(),
                metadata: Map::new(),
            },
            IndexHit {
                source_id: "A".into(),
                source_name: "A".into(),
                doc_uri: "doc://a".into(),
                chunk_index: 1,
                distance: 0.2,
                document: "a1".into(),
                metadata: Map::new(),
            },
            IndexHit {
                source_id: "B".into(),
                source_name: "B".into(),
                doc_uri: "doc://b".into(),
                chunk_index: 1,
                distance: 0.1,
                document: "b1".into(),
                metadata: Map::new(),
            },
        ];
        let citations = citations_from_hits(hits, None);
        let order: Vec<&str> = citations.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(order, vec!["B#1", "A#1", "A#2"]);
    }

    #[tokio::test]
    async fn similarity_threshold_filters_low_scores() {
        let hits = vec![IndexHit {
            source_id: "A".into(),
            source_name: "A".into(),
            doc_uri: "doc://a".into(),
            chunk_index: 0,
            distance: 0.9,
            document: "low score".into(),
            metadata: Map::new(),
        }];
        let citations = citations_from_hits(hits, Some(0.5));
        assert!(citations.is_empty());
    }

    #[tokio::test]
    async fn repeated_identical_query_is_served_from_cache() {
        let index = Arc::new(InMemoryVectorIndex::new());
        index.upsert(vec![item("a", 0, vec![1.0, 0.0], "hello")]).await.unwrap();
        let svc = service(index, true);
        let first = svc.search("find hello", None, None, &audit()).await.unwrap();
        assert!(!first.cache_hit);
        let second = svc.search("find hello", None, None, &audit()).await.unwrap();
        assert!(second.cache_hit);
    }
}
