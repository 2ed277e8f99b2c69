use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use vigil_core::AgentResult;
use vigil_model::{InvokeOptions, ModelGateway};
use vigil_telemetry::AuditContext;

use crate::agent::Agent;
use crate::analytics_store::{AnalyticsStore, SchemaDescriptor};
use crate::error::AgentError;

const DEFAULT_WINDOW_MINUTES: u64 = 60;
const DEFAULT_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
struct QueryInput {
    question: String,
}

/// Natural-language-to-SQL agent (spec.md §4.6). Generates one SQL
/// statement via the gateway, executes it against the analytics store,
/// and on failure requests exactly one refinement attempt before giving
/// up.
pub struct QueryAgent {
    gateway: Arc<ModelGateway>,
    store: Arc<dyn AnalyticsStore>,
    schema: SchemaDescriptor,
}

impl QueryAgent {
    pub fn new(gateway: Arc<ModelGateway>, store: Arc<dyn AnalyticsStore>, schema: SchemaDescriptor) -> Self {
        Self { gateway, store, schema }
    }

    fn generation_prompt(&self, question: &str) -> String {
        format!(
            "Generate exactly one SQL statement answering this question over {}.\n\
             Question: {question}\n\
             Default time window when not specified: last {DEFAULT_WINDOW_MINUTES} minutes.\n\
             Always apply LIMIT {DEFAULT_LIMIT} unless the question asks for a single aggregate.\n\
             Respond with SQL only, no prose.",
            self.schema.describe()
        )
    }

    fn refinement_prompt(&self, sql: &str, error: &str) -> String {
        format!("This SQL failed to execute:\n{sql}\nError: {error}\nFix this query and respond with SQL only, no prose.")
    }

    fn summarize(rows: &[serde_json::Map<String, Value>]) -> String {
        if rows.is_empty() {
            return "Query returned no rows.".to_string();
        }
        if rows.len() == 1 && rows[0].len() == 1 {
            let (_, value) = rows[0].iter().next().unwrap();
            return format!("Result: {value}");
        }
        format!("Query returned {} row(s).", rows.len())
    }
}

#[async_trait]
impl Agent for QueryAgent {
    fn name(&self) -> &str {
        "query"
    }

    async fn execute(&self, input: Value, audit: &AuditContext) -> AgentResult {
        let input: QueryInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(err) => return AgentResult::failure(AgentError::InvalidInput(err.to_string()).into()),
        };

        let sql = match self.gateway.invoke(self.generation_prompt(&input.question), InvokeOptions::default(), audit, false, false).await
        {
            Ok(sql) => sql,
            Err(err) => return AgentResult::failure(AgentError::Model(err).into()),
        };

        match self.store.execute(&sql).await {
            Ok(rows) => {
                let summary = Self::summarize(&rows);
                AgentResult::success(json!({"rows": rows, "summary": summary, "sql": sql}), Vec::new(), Value::Null)
            }
            Err(first_err) => {
                let refined_sql = match self
                    .gateway
                    .invoke(self.refinement_prompt(&sql, &first_err.to_string()), InvokeOptions::default(), audit, false, false)
                    .await
                {
                    Ok(sql) => sql,
                    Err(err) => return AgentResult::failure(AgentError::Model(err).into()),
                };
                match self.store.execute(&refined_sql).await {
                    Ok(rows) => {
                        let summary = Self::summarize(&rows);
                        AgentResult::success(
                            json!({"rows": rows, "summary": summary, "sql": refined_sql}),
                            Vec::new(),
                            Value::Null,
                        )
                    }
                    Err(second_err) => AgentResult::failure(AgentError::SqlExecutionError(second_err.to_string()).into()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics_store::{ColumnDescriptor, MockAnalyticsStore, SemanticType};
    use serde_json::Map;
    use vigil_core::Config;
    use vigil_model::MockLlm;
    use vigil_telemetry::StdoutSink;

    fn audit() -> AuditContext {
        AuditContext::create(false, "wf", None, None, Arc::new(StdoutSink::new()))
    }

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor::new(
            "events",
            vec![
                ColumnDescriptor::new("event_id", SemanticType::Id),
                ColumnDescriptor::new("risk_level", SemanticType::Categorical),
                ColumnDescriptor::new("event_time_ms", SemanticType::TimestampMs),
            ],
        )
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let gateway = Arc::new(ModelGateway::new(
            Arc::new(MockLlm::new("SELECT COUNT(*) FROM events WHERE risk_level='high'")),
            &Config::for_tests(),
        ));
        let mut row = Map::new();
        row.insert("count".to_string(), json!(7));
        let store = Arc::new(MockAnalyticsStore::new(vec![row]));
        let agent = QueryAgent::new(gateway, store, schema());
        let result = agent.execute(json!({"question": "How many high-risk events?"}), &audit()).await;
        assert!(result.success);
        assert_eq!(result.data["summary"], "Result: 7");
    }

    #[tokio::test]
    async fn refines_once_then_succeeds() {
        let gateway = Arc::new(ModelGateway::new(Arc::new(MockLlm::new("SELECT 1")), &Config::for_tests()));
        let store = Arc::new(MockAnalyticsStore::failing_first(vec![Map::new()], 1));
        let agent = QueryAgent::new(gateway, store.clone(), schema());
        let result = agent.execute(json!({"question": "How many events?"}), &audit()).await;
        assert!(result.success);
        assert_eq!(store.queries_seen().len(), 2);
    }

    #[tokio::test]
    async fn fails_after_second_attempt() {
        let gateway = Arc::new(ModelGateway::new(Arc::new(MockLlm::new("SELECT 1")), &Config::for_tests()));
        let store = Arc::new(MockAnalyticsStore::failing_first(vec![Map::new()], 2));
        let agent = QueryAgent::new(gateway, store, schema());
        let result = agent.execute(json!({"question": "How many events?"}), &audit()).await;
        assert!(!result.success);
    }
}
