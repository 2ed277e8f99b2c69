use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The canonical retrieval result unit. A `Citation` is immutable after
/// construction and its `{source_id, chunk_id}` pair must be unique
/// within a single `RetrievalResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub source_id: String,
    pub source_name: String,
    pub doc_uri: String,
    pub chunk_id: String,
    pub snippet: String,
    pub score: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Citation {
    /// Construct a citation, rejecting a score outside `[0.0, 1.0]`.
    pub fn new(
        source_id: impl Into<String>,
        source_name: impl Into<String>,
        doc_uri: impl Into<String>,
        chunk_id: impl Into<String>,
        snippet: impl Into<String>,
        score: f64,
        metadata: Map<String, Value>,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&score) {
            return Err(CoreError::InvalidCitation(format!(
                "score {score} is outside the valid range [0.0, 1.0]"
            )));
        }
        Ok(Self {
            source_id: source_id.into(),
            source_name: source_name.into(),
            doc_uri: doc_uri.into(),
            chunk_id: chunk_id.into(),
            snippet: snippet.into(),
            score,
            metadata,
        })
    }

    /// The `(source_id, chunk_id)` identity used for dedup, ordering
    /// ties, and uniqueness checks.
    pub fn identity(&self) -> (&str, &str) {
        (&self.source_id, &self.chunk_id)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).expect("Citation always serializes")
    }

    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| CoreError::InvalidCitation(format!("malformed citation json: {e}")))
    }
}

/// An ordered retrieval result: citations sorted by descending score
/// (ties broken by ascending `(source_id, chunk_id)`), the raw
/// implementation-defined hits behind them, and the metrics the audit
/// event for this retrieval will carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub citations: Vec<Citation>,
    pub raw_hits: Vec<Value>,
    pub query_length: usize,
    pub n_results: usize,
    pub strategy: String,
    pub cache_hit: bool,
    pub latency_ms: f64,
}

impl RetrievalResult {
    pub fn empty(query_length: usize, strategy: impl Into<String>) -> Self {
        Self {
            citations: Vec::new(),
            raw_hits: Vec::new(),
            query_length,
            n_results: 0,
            strategy: strategy.into(),
            cache_hit: false,
            latency_ms: 0.0,
        }
    }
}
