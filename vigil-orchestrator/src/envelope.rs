use serde::Serialize;
use serde_json::Value;

use vigil_core::{Citation, ClassifiedError};
use vigil_telemetry::TraceMetadata;

/// The sole public response shape `process_request` returns (spec.md
/// §6). `error` is present only when `success` is false; `trace` is
/// present only when `include_trace_in_response` is set.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub sources: Vec<Citation>,
    pub used_agents: Vec<String>,
    pub partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ClassifiedError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceMetadata>,
}

impl ResponseEnvelope {
    /// The orchestrator never raises to its own caller (spec.md §4.7):
    /// a fatal dispatch failure still produces an envelope, just with
    /// `success: false` and a classified error.
    pub fn failure(error: ClassifiedError, trace: Option<TraceMetadata>) -> Self {
        Self {
            success: false,
            answer_text: None,
            data: None,
            sources: Vec::new(),
            used_agents: Vec::new(),
            partial: false,
            error: Some(error),
            trace,
        }
    }
}
