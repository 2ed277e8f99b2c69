use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Map, Value};
use tracing::debug;

use vigil_agent::{AnalyticsAgent, Agent, AnalyticsStore, KnowledgeAgent, QueryAgent, RecommendationsAgent, SchemaDescriptor, TriageAgent};
use vigil_agent::agents::analytics::SurgeThresholds;
use vigil_core::{AgentResult, AuditOperation, Citation, ClassifiedError, Config, FeatureFlags};
use vigil_model::ModelGateway;
use vigil_retrieval::RetrievalService;
use vigil_telemetry::{AuditContext, AuditSink};

use crate::classify::{classify_intent, IntentLabel, CONFIDENCE_FLOOR};
use crate::envelope::ResponseEnvelope;

/// The request-level state machine named in spec.md §4.7. No graph
/// framework: just an enum and a straight-line switch, as the state
/// space is fixed and small.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrchestratorState {
    Start,
    Classify,
    Dispatch,
    Synthesize,
    Done,
}

const TRIAGE_CANDIDATES_SQL: &str =
    "SELECT event_id, risk_level, suicidal_ideation, homicidal_ideation, substance_use, minutes_since_event \
     FROM events WHERE risk_level IN ('high', 'imminent') ORDER BY event_time_ms DESC LIMIT 100";

/// One dispatched agent's outcome, tagged with whether its failure
/// alone should sink the overall response (spec.md §4.7 failure
/// semantics: "if the only agent fails, success=false").
struct Dispatched {
    name: &'static str,
    result: AgentResult,
}

/// The request-level orchestrator (spec.md §4.7): classifies intent,
/// dispatches one or more specialist agents sharing one
/// [`AuditContext`], and synthesizes a [`ResponseEnvelope`]. Never
/// raises to its caller — every failure, including a classification
/// failure, is reported in the envelope (spec.md §7).
pub struct Orchestrator {
    gateway: Arc<ModelGateway>,
    query_agent: QueryAgent,
    analytics_agent: AnalyticsAgent,
    triage_agent: TriageAgent,
    recommendations_agent: RecommendationsAgent,
    knowledge_agent: KnowledgeAgent,
    analytics_store: Arc<dyn AnalyticsStore>,
    sink: Arc<dyn AuditSink>,
    flags: FeatureFlags,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<ModelGateway>,
        retrieval: Arc<RetrievalService>,
        analytics_store: Arc<dyn AnalyticsStore>,
        schema: SchemaDescriptor,
        sink: Arc<dyn AuditSink>,
        config: &Config,
    ) -> Self {
        let thresholds = SurgeThresholds {
            surge_multiplier: config.surge_multiplier,
            min_absolute_rate: config.min_absolute_rate,
            window_minutes: config.analytics_window_minutes,
        };
        Self {
            query_agent: QueryAgent::new(gateway.clone(), analytics_store.clone(), schema),
            analytics_agent: AnalyticsAgent::new(gateway.clone(), analytics_store.clone(), thresholds),
            triage_agent: TriageAgent::new(),
            recommendations_agent: RecommendationsAgent::new(gateway.clone()),
            knowledge_agent: KnowledgeAgent::new(gateway.clone(), retrieval),
            gateway,
            analytics_store,
            sink,
            flags: config.flags,
        }
    }

    /// The sole public entry point (spec.md §6).
    pub async fn process_request(
        &self,
        query: &str,
        workflow_id: &str,
        tenant_id: Option<String>,
        inbound_trace_id: Option<&str>,
    ) -> ResponseEnvelope {
        let mut state = OrchestratorState::Start;
        debug!(?state, "process_request started");

        let audit = AuditContext::create(self.flags.platform_enabled, workflow_id, tenant_id, inbound_trace_id, self.sink.clone());
        let request_start = Instant::now();

        if query.trim().is_empty() {
            let error = ClassifiedError::validation("query must not be empty");
            let latency_ms = request_start.elapsed().as_secs_f64() * 1000.0;
            self.record_api_request(&audit, false, latency_ms);
            audit.close();
            return ResponseEnvelope::failure(error, self.trace_metadata(&audit));
        }

        state = OrchestratorState::Classify;
        debug!(?state, "classifying intent");
        let classification = classify_intent(&self.gateway, query, &audit).await;

        state = OrchestratorState::Dispatch;
        debug!(?state, label = ?classification.label, confidence = classification.confidence, "dispatching");
        let (primary, dispatched) = if classification.confidence < CONFIDENCE_FLOOR {
            self.dispatch_policy_question(query, &audit).await
        } else {
            match classification.label {
                IntentLabel::DataQuery => self.dispatch_data_query(query, &audit).await,
                IntentLabel::Analytics => self.dispatch_analytics(query, &audit).await,
                IntentLabel::Triage => self.dispatch_triage(&audit).await,
                IntentLabel::Recommendations => self.dispatch_recommendations(query, &audit).await,
                IntentLabel::PolicyQuestion | IntentLabel::Unknown => {
                    self.dispatch_policy_question(query, &audit).await
                }
            }
        };

        state = OrchestratorState::Synthesize;
        debug!(?state, "synthesizing response");
        let envelope = self.synthesize(primary, dispatched, &audit);

        state = OrchestratorState::Done;
        let latency_ms = request_start.elapsed().as_secs_f64() * 1000.0;
        self.record_api_request(&audit, envelope.success, latency_ms);
        debug!(?state, success = envelope.success, partial = envelope.partial, "process_request done");
        audit.close();
        envelope
    }

    async fn dispatch_agent_step(&self, agent: &dyn Agent, name: &'static str, input: Value, audit: &AuditContext) -> Dispatched {
        let start = Instant::now();
        let result = agent.execute(input, audit).await;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        audit.record(AuditOperation::AgentStep, result.success, latency_ms, [("agent", json!(name))]);
        Dispatched { name, result }
    }

    async fn dispatch_data_query(&self, query: &str, audit: &AuditContext) -> (&'static str, Vec<Dispatched>) {
        let dispatched = self
            .dispatch_agent_step(&self.query_agent, "query", json!({"question": query}), audit)
            .await;
        ("query", vec![dispatched])
    }

    async fn dispatch_analytics(&self, query: &str, audit: &AuditContext) -> (&'static str, Vec<Dispatched>) {
        // "analytics -> Analytics (optionally Query for backing numbers)":
        // the two are independent of each other, so they fan out.
        let (analytics, backing_query) = futures::join!(
            self.dispatch_agent_step(&self.analytics_agent, "analytics", json!({}), audit),
            self.dispatch_agent_step(&self.query_agent, "query", json!({"question": query}), audit),
        );
        ("analytics", vec![analytics, backing_query])
    }

    async fn dispatch_triage(&self, audit: &AuditContext) -> (&'static str, Vec<Dispatched>) {
        let rows = match self.analytics_store.execute(TRIAGE_CANDIDATES_SQL).await {
            Ok(rows) => rows,
            Err(err) => {
                let result = AgentResult::failure(err.into());
                audit.record(AuditOperation::AgentStep, false, 0.0, [("agent", json!("triage"))]);
                return ("triage", vec![Dispatched { name: "triage", result }]);
            }
        };
        let events: Vec<Value> = rows.into_iter().map(Value::Object).collect();
        let dispatched =
            self.dispatch_agent_step(&self.triage_agent, "triage", json!({"events": events}), audit).await;
        ("triage", vec![dispatched])
    }

    async fn dispatch_recommendations(&self, query: &str, audit: &AuditContext) -> (&'static str, Vec<Dispatched>) {
        let focus_area = infer_focus_area(query);
        let (query_result, analytics_result) = futures::join!(
            self.dispatch_agent_step(&self.query_agent, "query", json!({"question": query}), audit),
            self.dispatch_agent_step(&self.analytics_agent, "analytics", json!({}), audit),
        );

        let mut context = Map::new();
        if query_result.result.success {
            context.insert("query_summary".to_string(), query_result.result.data.get("summary").cloned().unwrap_or(Value::Null));
        }
        if analytics_result.result.success {
            context.insert("surges".to_string(), analytics_result.result.data.get("surges").cloned().unwrap_or(Value::Null));
        }

        let recommendations = self
            .dispatch_agent_step(
                &self.recommendations_agent,
                "recommendations",
                json!({"focus_area": focus_area, "context": Value::Object(context)}),
                audit,
            )
            .await;

        ("recommendations", vec![query_result, analytics_result, recommendations])
    }

    async fn dispatch_policy_question(&self, query: &str, audit: &AuditContext) -> (&'static str, Vec<Dispatched>) {
        let dispatched = self
            .dispatch_agent_step(&self.knowledge_agent, "knowledge", json!({"question": query}), audit)
            .await;
        ("knowledge", vec![dispatched])
    }

    fn synthesize(&self, primary: &'static str, dispatched: Vec<Dispatched>, audit: &AuditContext) -> ResponseEnvelope {
        let succeeded: Vec<&Dispatched> = dispatched.iter().filter(|d| d.result.success).collect();
        let failed: Vec<&Dispatched> = dispatched.iter().filter(|d| !d.result.success).collect();

        if succeeded.is_empty() {
            let error = failed
                .first()
                .and_then(|d| d.result.error.clone())
                .unwrap_or_else(|| ClassifiedError::internal("no agent was dispatched"));
            return ResponseEnvelope::failure(error, self.trace_metadata(audit));
        }

        let used_agents: Vec<String> = succeeded.iter().map(|d| d.name.to_string()).collect();
        let sources = dedup_sources(succeeded.iter().flat_map(|d| d.result.sources.iter().cloned()));
        let data = Value::Object(succeeded.iter().map(|d| (d.name.to_string(), d.result.data.clone())).collect());
        let answer_text = succeeded
            .iter()
            .find(|d| d.name == primary)
            .or_else(|| succeeded.first())
            .and_then(|d| answer_text_for(d.name, &d.result.data));

        ResponseEnvelope {
            success: true,
            answer_text,
            data: Some(data),
            sources,
            used_agents,
            partial: !failed.is_empty(),
            error: None,
            trace: self.trace_metadata(audit),
        }
    }

    fn trace_metadata(&self, audit: &AuditContext) -> Option<vigil_telemetry::TraceMetadata> {
        self.flags.include_trace_in_response.then(|| audit.get_trace_metadata())
    }

    fn record_api_request(&self, audit: &AuditContext, success: bool, latency_ms: f64) {
        let status_code = if success { 200 } else { 500 };
        audit.record(
            AuditOperation::ApiRequest,
            success,
            latency_ms,
            [("endpoint", json!("process_request")), ("method", json!("internal")), ("status_code", json!(status_code))],
        );
    }
}

/// Open Question resolution (spec.md §9): the spec names a closed
/// `focus_area` vocabulary for the Recommendations Agent but not how
/// the orchestrator derives it from free text. Keyword match against
/// the vocabulary, defaulting to `staffing` — the simplest rule
/// consistent with the spec naming only these three values.
fn infer_focus_area(query: &str) -> &'static str {
    let lower = query.to_ascii_lowercase();
    if lower.contains("equity") {
        "equity"
    } else if lower.contains("efficiency") {
        "efficiency"
    } else {
        "staffing"
    }
}

fn answer_text_for(name: &str, data: &Value) -> Option<String> {
    match name {
        "query" => data.get("summary").and_then(Value::as_str).map(str::to_string),
        "analytics" => data.get("interpretation").and_then(Value::as_str).map(str::to_string),
        "knowledge" => data.get("answer").and_then(Value::as_str).map(str::to_string),
        "triage" => data.as_array().map(|events| format!("Ranked {} candidate event(s) by risk.", events.len())),
        "recommendations" => data.get("recommendations").and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("recommendation").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("; ")
        }),
        _ => None,
    }
}

/// Deduplicated union of sources across every successful agent,
/// preserving the highest-score occurrence of each `{source_id,
/// chunk_id}` identity, ordered by descending score with ascending
/// `(source_id, chunk_id)` tie-break (spec.md §4.7, mirroring §4.4's
/// ordering rule).
fn dedup_sources(citations: impl Iterator<Item = Citation>) -> Vec<Citation> {
    let mut best: std::collections::HashMap<(String, String), Citation> = std::collections::HashMap::new();
    for citation in citations {
        let key = (citation.source_id.clone(), citation.chunk_id.clone());
        match best.get(&key) {
            Some(existing) if existing.score >= citation.score => {}
            _ => {
                best.insert(key, citation);
            }
        }
    }
    let mut result: Vec<Citation> = best.into_values().collect();
    result.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.source_id.cmp(&b.source_id))
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    result
}
