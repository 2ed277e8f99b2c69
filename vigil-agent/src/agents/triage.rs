use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use vigil_core::AgentResult;
use vigil_telemetry::AuditContext;

use crate::agent::Agent;
use crate::error::AgentError;

#[derive(Debug, Clone, Deserialize)]
pub struct TriageEvent {
    pub event_id: String,
    pub risk_level: String,
    #[serde(default)]
    pub suicidal_ideation: bool,
    #[serde(default)]
    pub homicidal_ideation: bool,
    #[serde(default)]
    pub substance_use: bool,
    pub minutes_since_event: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct TriageInput {
    events: Vec<TriageEvent>,
}

/// `score = risk_base + ideation_adders + substance_adder + recency_factor`
/// (spec.md §4.6). A pure function: identical inputs always yield an
/// identical score (spec.md §8).
pub fn triage_score(event: &TriageEvent) -> f64 {
    let risk_base = match event.risk_level.as_str() {
        "imminent" => 100.0,
        "high" => 50.0,
        _ => 0.0,
    };
    let ideation_adders = 30.0 * event.suicidal_ideation as u8 as f64 + 40.0 * event.homicidal_ideation as u8 as f64;
    let substance_adder = 10.0 * event.substance_use as u8 as f64;
    let recency_factor = (20.0 - event.minutes_since_event / 3.0).max(0.0);
    risk_base + ideation_adders + substance_adder + recency_factor
}

/// Fixed recommended-action vocabulary (spec.md §4.6). Open-question
/// resolution: the spec names the vocabulary and one worked example
/// (score 159, `risk_level="imminent"` → `dispatch_mobile_team`) but
/// does not give the full decision table; this threshold ladder is the
/// simplest one consistent with that example.
pub fn recommended_action(event: &TriageEvent, score: f64) -> &'static str {
    if event.risk_level == "imminent" && score >= 150.0 {
        "dispatch_mobile_team"
    } else if event.homicidal_ideation {
        "law_enforcement_assist"
    } else if event.risk_level == "imminent" || score >= 100.0 {
        "psychiatric_evaluation"
    } else if score >= 50.0 {
        "follow_up_contact"
    } else {
        "no_action"
    }
}

/// Ranks high-risk candidate events by deterministic score (spec.md
/// §4.6). Ties break by newer first (smaller `minutes_since_event`),
/// then by smaller `event_id` lexicographically.
#[derive(Default)]
pub struct TriageAgent;

impl TriageAgent {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Agent for TriageAgent {
    fn name(&self) -> &str {
        "triage"
    }

    async fn execute(&self, input: Value, _audit: &AuditContext) -> AgentResult {
        let input: TriageInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(err) => return AgentResult::failure(AgentError::InvalidInput(err.to_string()).into()),
        };

        let mut ranked: Vec<(TriageEvent, f64, &'static str)> = input
            .events
            .into_iter()
            .map(|event| {
                let score = triage_score(&event);
                let action = recommended_action(&event, score);
                (event, score, action)
            })
            .collect();

        ranked.sort_by(|(a_event, a_score, _), (b_event, b_score, _)| {
            b_score
                .partial_cmp(a_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a_event.minutes_since_event.partial_cmp(&b_event.minutes_since_event).unwrap())
                .then_with(|| a_event.event_id.cmp(&b_event.event_id))
        });

        let data = json!(ranked
            .into_iter()
            .map(|(event, score, action)| json!({
                "event_id": event.event_id,
                "score": score,
                "recommended_action": action,
            }))
            .collect::<Vec<_>>());

        AgentResult::success(data, Vec::new(), Value::Null)
    }
}
