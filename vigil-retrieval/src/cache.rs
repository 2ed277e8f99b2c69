use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use vigil_core::RetrievalResult;

/// `(normalized_query, n_results, similarity_threshold, subset_predicate_id)`
/// — the cache key spec.md §4.4 prescribes. `similarity_threshold` is
/// stored as its bit pattern so the key can derive `Hash`/`Eq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    normalized_query: String,
    n_results: usize,
    similarity_threshold_bits: Option<u64>,
    subset_predicate_id: Option<String>,
}

impl CacheKey {
    pub fn new(
        query: &str,
        n_results: usize,
        similarity_threshold: Option<f64>,
        subset_predicate_id: Option<&str>,
    ) -> Self {
        Self {
            normalized_query: query.trim().to_lowercase(),
            n_results,
            similarity_threshold_bits: similarity_threshold.map(f64::to_bits),
            subset_predicate_id: subset_predicate_id.map(str::to_string),
        }
    }
}

struct Entry {
    value: RetrievalResult,
    inserted_at: Instant,
}

/// A hand-rolled, capacity-bounded, TTL-expiring in-memory LRU keyed by
/// [`CacheKey`]. A short lock guards both the map and the recency
/// order per spec.md §5 ("Retrieval cache: LRU updates under a short
/// lock"). Only active when `retrieval_cache_enabled` is set.
pub struct RetrievalCache {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner>,
}

struct Inner {
    entries: HashMap<CacheKey, Entry>,
    order: VecDeque<CacheKey>,
}

impl RetrievalCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            inner: Mutex::new(Inner { entries: HashMap::new(), order: VecDeque::new() }),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<RetrievalResult> {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let expired = inner.entries.get(key).map(|e| e.inserted_at.elapsed() > self.ttl).unwrap_or(false);
        if expired {
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            return None;
        }
        if let Some(entry) = inner.entries.get(key) {
            let value = entry.value.clone();
            inner.order.retain(|k| k != key);
            inner.order.push_back(key.clone());
            return Some(value);
        }
        None
    }

    pub fn put(&self, key: CacheKey, value: RetrievalResult) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if inner.entries.contains_key(&key) {
            inner.order.retain(|k| k != &key);
        } else if inner.entries.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(key, Entry { value, inserted_at: Instant::now() });
    }
}
