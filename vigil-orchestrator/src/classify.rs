use serde::{Deserialize, Serialize};

use vigil_model::{InvokeOptions, ModelGateway};
use vigil_telemetry::AuditContext;

/// The closed intent label set the orchestrator routes on (spec.md
/// §4.7). `Unknown` and low confidence both fall back to the
/// Knowledge Agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentLabel {
    DataQuery,
    Analytics,
    Triage,
    Recommendations,
    PolicyQuestion,
    Unknown,
}

/// A single gateway call's classification result.
#[derive(Debug, Clone, Copy)]
pub struct Classification {
    pub label: IntentLabel,
    pub confidence: f64,
}

/// The minimum confidence a classification must clear before the
/// orchestrator trusts the label rather than falling back to the
/// Knowledge Agent (spec.md §4.7).
pub const CONFIDENCE_FLOOR: f64 = 0.3;

#[derive(Deserialize)]
struct RawClassification {
    label: IntentLabel,
    confidence: f64,
}

fn classification_prompt(query: &str) -> String {
    format!(
        "Classify this crisis-intake request into exactly one label from \
         {{data_query, analytics, triage, recommendations, policy_question, unknown}} \
         and give your confidence as a number from 0.0 to 1.0.\n\
         Request: {query}\n\
         Respond with JSON only, no prose: {{\"label\": <label>, \"confidence\": <number>}}."
    )
}

/// Parses a classification response, tolerating a response wrapped in
/// prose by extracting the first `{...}` object. Any parse failure is
/// treated as `Unknown` at zero confidence rather than propagated —
/// classification never blocks the orchestrator's fallback path.
fn parse_classification(raw: &str) -> Classification {
    let object_slice = match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if end > start => &raw[start..=end],
        _ => raw,
    };
    match serde_json::from_str::<RawClassification>(object_slice) {
        Ok(parsed) => Classification { label: parsed.label, confidence: parsed.confidence.clamp(0.0, 1.0) },
        Err(_) => Classification { label: IntentLabel::Unknown, confidence: 0.0 },
    }
}

/// Single gateway call mapping a natural-language query to an intent
/// label plus confidence (spec.md §4.7). Never fails outward: a
/// gateway error is folded into `Unknown` at zero confidence so the
/// orchestrator can always fall back to the Knowledge Agent.
pub async fn classify_intent(gateway: &ModelGateway, query: &str, audit: &AuditContext) -> Classification {
    match gateway.invoke(classification_prompt(query), InvokeOptions::default(), audit, false, false).await {
        Ok(text) => parse_classification(&text),
        Err(_) => Classification { label: IntentLabel::Unknown, confidence: 0.0 },
    }
}
