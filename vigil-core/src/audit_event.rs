use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The closed set of audit operations. Every structured event written
/// to the audit sink carries one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    ApiRequest,
    LlmCall,
    Retrieval,
    AgentStep,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiRequest => "api_request",
            Self::LlmCall => "llm_call",
            Self::Retrieval => "retrieval",
            Self::AgentStep => "agent_step",
        }
    }
}

/// One line of the audit sink: the four identity fields every event
/// carries, the operation-independent fields, and an open map for the
/// operation-specific fields (`model`, `tokens_estimate`, `endpoint`,
/// ...). Never holds a raw prompt, raw response, or credential-shaped
/// string unless the corresponding opt-in flag allowed it upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub trace_id: String,
    pub request_id: String,
    pub workflow_id: String,
    pub tenant_id: String,
    pub operation: AuditOperation,
    pub latency_ms: f64,
    pub success: bool,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

impl AuditEvent {
    /// Render this event as a single JSON line, as the sink contract
    /// requires ("appends a line atomically per event").
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).expect("AuditEvent always serializes")
    }
}
