use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use vigil_core::AgentResult;
use vigil_model::{InvokeOptions, ModelGateway};
use vigil_retrieval::RetrievalService;
use vigil_telemetry::AuditContext;

use crate::agent::Agent;
use crate::error::AgentError;

const NO_SOURCE_ANSWER: &str = "no authoritative source found";
const N_RESULTS: usize = 5;
const SIMILARITY_THRESHOLD: f64 = 0.3;

#[derive(Debug, Deserialize)]
struct KnowledgeInput {
    question: String,
}

/// Retrieval-augmented answering over the policy knowledge index
/// (spec.md §4.6). Answers strictly from retrieved snippets, citing
/// each claim by `source_name` and `chunk_id`. Never hallucinates when
/// retrieval comes back empty.
pub struct KnowledgeAgent {
    gateway: Arc<ModelGateway>,
    retrieval: Arc<RetrievalService>,
}

impl KnowledgeAgent {
    pub fn new(gateway: Arc<ModelGateway>, retrieval: Arc<RetrievalService>) -> Self {
        Self { gateway, retrieval }
    }
}

#[async_trait]
impl Agent for KnowledgeAgent {
    fn name(&self) -> &str {
        "knowledge"
    }

    async fn execute(&self, input: Value, audit: &AuditContext) -> AgentResult {
        let input: KnowledgeInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(err) => return AgentResult::failure(AgentError::InvalidInput(err.to_string()).into()),
        };

        let retrieval_result =
            match self.retrieval.search(&input.question, Some(N_RESULTS), Some(SIMILARITY_THRESHOLD), audit).await {
                Ok(r) => r,
                Err(err) => return AgentResult::failure(AgentError::Retrieval(err).into()),
            };

        if retrieval_result.citations.is_empty() {
            return AgentResult::success(json!({"answer": NO_SOURCE_ANSWER}), Vec::new(), Value::Null);
        }

        let snippets = retrieval_result
            .citations
            .iter()
            .map(|c| format!("[{}#{}] {}", c.source_name, c.chunk_id, c.snippet))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Answer the question strictly from these snippets, citing each claim by source name and chunk id.\n\
             Question: {}\nSnippets:\n{snippets}",
            input.question
        );

        let answer = match self.gateway.invoke(prompt, InvokeOptions::default(), audit, false, false).await {
            Ok(text) => text,
            Err(err) => return AgentResult::failure(AgentError::Model(err).into()),
        };

        AgentResult::success(json!({"answer": answer}), retrieval_result.citations, Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::Config;
    use vigil_model::MockLlm;
    use vigil_retrieval::{IndexItem, InMemoryVectorIndex, VectorIndex};
    use vigil_telemetry::StdoutSink;

    fn audit() -> AuditContext {
        AuditContext::create(false, "wf", None, None, Arc::new(StdoutSink::new()))
    }

    fn gateway(response: &str) -> Arc<ModelGateway> {
        Arc::new(ModelGateway::new(Arc::new(MockLlm::new(response)), &Config::for_tests()))
    }

    #[tokio::test]
    async fn empty_retrieval_returns_no_source_found() {
        let index = Arc::new(InMemoryVectorIndex::new());
        let gw = gateway("unused");
        let retrieval = Arc::new(RetrievalService::new(index, gw.clone(), &Config::for_tests()));
        let agent = KnowledgeAgent::new(gw, retrieval);
        let result = agent.execute(json!({"question": "what is the protocol?"}), &audit()).await;
        assert!(result.success);
        assert_eq!(result.data["answer"], NO_SOURCE_ANSWER);
        assert!(result.sources.is_empty());
    }

    #[tokio::test]
    async fn answers_from_retrieved_snippets_when_present() {
        let question = "what are the response protocols?";
        let gw = gateway("Mobile teams respond within 30 minutes [Crisis Response Statute#statute-1#0].");
        // Store the chunk under the exact embedding the mock provider produces
        // for the query text, so the brute-force index scores it a perfect match.
        let embedding = gw.embed(vec![question.to_string()], None, &audit()).await.unwrap().remove(0);
        let index = Arc::new(InMemoryVectorIndex::new());
        index
            .upsert(vec![IndexItem {
                source_id: "statute-1".into(),
                source_name: "Crisis Response Statute".into(),
                doc_uri: "doc://statute-1".into(),
                chunk_index: 0,
                text: "Mobile teams respond within 30 minutes.".into(),
                embedding,
                metadata: serde_json::Map::new(),
            }])
            .await
            .unwrap();
        let retrieval = Arc::new(RetrievalService::new(index, gw.clone(), &Config::for_tests()));
        let agent = KnowledgeAgent::new(gw, retrieval);
        let result = agent.execute(json!({"question": question}), &audit()).await;
        assert!(result.success);
        assert!(!result.sources.is_empty());
    }
}
