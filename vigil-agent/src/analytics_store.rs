use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::AgentError;

/// The closed semantic-type-tag set a schema descriptor's columns are
/// drawn from (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    Id,
    TimestampMs,
    Categorical,
    Numeric,
    Boolean,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::TimestampMs => "timestamp_ms",
            Self::Categorical => "categorical",
            Self::Numeric => "numeric",
            Self::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    pub name: String,
    pub semantic_type: SemanticType,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self { name: name.into(), semantic_type }
    }
}

/// Table name, column names, and column semantic types, handed to the
/// Query Agent so it can ground its generated SQL (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl SchemaDescriptor {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        Self { table: table.into(), columns }
    }

    /// Rendered for inclusion in a gateway prompt.
    pub fn describe(&self) -> String {
        let cols = self
            .columns
            .iter()
            .map(|c| format!("{} ({})", c.name, c.semantic_type.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("table `{}` with columns: {cols}", self.table)
    }
}

/// A SQL-capable columnar engine accessed through a thin client
/// (spec.md §6). Time is milliseconds since epoch.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<Vec<Map<String, Value>>, AgentError>;
}

/// An in-memory test double: returns a canned row set for every query,
/// or fails a configured number of times before succeeding (to drive
/// the Query Agent's one-refinement-attempt behavior).
pub struct MockAnalyticsStore {
    rows: Vec<Map<String, Value>>,
    fail_times: std::sync::atomic::AtomicU32,
    last_sql: std::sync::Mutex<Vec<String>>,
}

impl MockAnalyticsStore {
    pub fn new(rows: Vec<Map<String, Value>>) -> Self {
        Self { rows, fail_times: std::sync::atomic::AtomicU32::new(0), last_sql: std::sync::Mutex::new(Vec::new()) }
    }

    pub fn failing_first(rows: Vec<Map<String, Value>>, times: u32) -> Self {
        Self { rows, fail_times: std::sync::atomic::AtomicU32::new(times), last_sql: std::sync::Mutex::new(Vec::new()) }
    }

    pub fn queries_seen(&self) -> Vec<String> {
        self.last_sql.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalyticsStore for MockAnalyticsStore {
    async fn execute(&self, sql: &str) -> Result<Vec<Map<String, Value>>, AgentError> {
        self.last_sql.lock().unwrap().push(sql.to_string());
        let remaining = self.fail_times.load(std::sync::atomic::Ordering::SeqCst);
        if remaining > 0 {
            self.fail_times.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
            return Err(AgentError::SqlExecutionError(format!("simulated failure for: {sql}")));
        }
        Ok(self.rows.clone())
    }
}
