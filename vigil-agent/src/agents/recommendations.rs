use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use vigil_core::AgentResult;
use vigil_model::{InvokeOptions, ModelGateway};
use vigil_telemetry::AuditContext;

use crate::agent::Agent;
use crate::error::AgentError;

#[derive(Debug, Deserialize)]
struct RecommendationsInput {
    focus_area: String,
    #[serde(default)]
    window_minutes: Option<u64>,
    /// Optional supporting numbers pulled by the orchestrator from the
    /// Query and Analytics agents before this agent runs (spec.md
    /// §4.6: "pulls inputs via Query and Analytics agents").
    #[serde(default)]
    context: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Recommendation {
    #[allow(dead_code)]
    recommendation: String,
    #[allow(dead_code)]
    rationale: String,
    #[allow(dead_code)]
    evidence_refs: Vec<String>,
    estimated_effort: String,
}

fn validate(raw: &str) -> Result<Vec<Recommendation>, String> {
    let items: Vec<Recommendation> = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    if !(5..=7).contains(&items.len()) {
        return Err(format!("expected 5-7 recommendations, got {}", items.len()));
    }
    for item in &items {
        if !matches!(item.estimated_effort.as_str(), "low" | "medium" | "high") {
            return Err(format!("invalid estimated_effort: {}", item.estimated_effort));
        }
    }
    Ok(items)
}

/// Generates 5-7 schema-validated recommendations for a focus area
/// (spec.md §4.6). Regenerates once on schema-validation failure; after
/// two failures returns the raw text with `success=false`.
pub struct RecommendationsAgent {
    gateway: Arc<ModelGateway>,
}

impl RecommendationsAgent {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }

    fn prompt(&self, focus_area: &str, window_minutes: u64, context: Option<&Value>, correction: Option<&str>) -> String {
        let mut base = format!(
            "Produce 5 to 7 recommendations for the focus area \"{focus_area}\" over the last {window_minutes} minutes. \
             Respond with a JSON array; each item must have exactly the fields \
             {{\"recommendation\": string, \"rationale\": string, \"evidence_refs\": array of strings, \
             \"estimated_effort\": \"low\"|\"medium\"|\"high\"}}. Respond with JSON only, no prose."
        );
        if let Some(context) = context {
            base.push_str(&format!("\nSupporting data pulled from query and analytics agents: {context}"));
        }
        match correction {
            Some(err) => format!("{base}\nThe previous response was rejected: {err}. Correct it."),
            None => base,
        }
    }
}

#[async_trait]
impl Agent for RecommendationsAgent {
    fn name(&self) -> &str {
        "recommendations"
    }

    async fn execute(&self, input: Value, audit: &AuditContext) -> AgentResult {
        let input: RecommendationsInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(err) => return AgentResult::failure(AgentError::InvalidInput(err.to_string()).into()),
        };
        let window_minutes = input.window_minutes.unwrap_or(60);

        let first = match self
            .gateway
            .invoke(
                self.prompt(&input.focus_area, window_minutes, input.context.as_ref(), None),
                InvokeOptions::default(),
                audit,
                false,
                false,
            )
            .await
        {
            Ok(text) => text,
            Err(err) => return AgentResult::failure(AgentError::Model(err).into()),
        };

        let validation_error = match validate(&first) {
            Ok(items) => {
                return AgentResult::success(json!({"recommendations": items_to_json(&items)}), Vec::new(), Value::Null)
            }
            Err(err) => err,
        };

        let second = match self
            .gateway
            .invoke(
                self.prompt(&input.focus_area, window_minutes, input.context.as_ref(), Some(&validation_error)),
                InvokeOptions::default(),
                audit,
                false,
                false,
            )
            .await
        {
            Ok(text) => text,
            Err(err) => return AgentResult::failure(AgentError::Model(err).into()),
        };

        match validate(&second) {
            Ok(items) => AgentResult::success(json!({"recommendations": items_to_json(&items)}), Vec::new(), Value::Null),
            Err(err) => AgentResult::failure(AgentError::SchemaViolation(format!("{err}; raw: {second}")).into()),
        }
    }
}

fn items_to_json(items: &[Recommendation]) -> Value {
    json!(items
        .iter()
        .map(|i| json!({
            "recommendation": i.recommendation,
            "rationale": i.rationale,
            "evidence_refs": i.evidence_refs,
            "estimated_effort": i.estimated_effort,
        }))
        .collect::<Vec<_>>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::Config;
    use vigil_model::MockLlm;
    use vigil_telemetry::StdoutSink;

    fn audit() -> AuditContext {
        AuditContext::create(false, "wf", None, None, Arc::new(StdoutSink::new()))
    }

    fn valid_batch() -> String {
        let item = json!({
            "recommendation": "Add a second crisis line during peak hours",
            "rationale": "Surge rate exceeds current staffing capacity",
            "evidence_refs": ["row-1"],
            "estimated_effort": "medium",
        });
        json!(vec![item; 5]).to_string()
    }

    #[tokio::test]
    async fn accepts_valid_schema_on_first_attempt() {
        let gateway = Arc::new(ModelGateway::new(Arc::new(MockLlm::new(valid_batch())), &Config::for_tests()));
        let agent = RecommendationsAgent::new(gateway);
        let result = agent.execute(json!({"focus_area": "staffing"}), &audit()).await;
        assert!(result.success);
        assert_eq!(result.data["recommendations"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn rejects_malformed_schema_twice() {
        let gateway = Arc::new(ModelGateway::new(Arc::new(MockLlm::new("not json")), &Config::for_tests()));
        let agent = RecommendationsAgent::new(gateway);
        let result = agent.execute(json!({"focus_area": "equity"}), &audit()).await;
        assert!(!result.success);
    }
}
