use crate::citation::Citation;
use crate::error::ClassifiedError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The uniform shape every specialist agent returns. Agents never raise
/// to their caller: a failure is reported as `success: false` with a
/// `ClassifiedError` embedded in `metadata` via [`AgentResult::failure`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub data: Value,
    pub sources: Vec<Citation>,
    pub metadata: Value,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ClassifiedError>,
}

impl AgentResult {
    pub fn success(data: Value, sources: Vec<Citation>, metadata: Value) -> Self {
        Self { data, sources, metadata, success: true, error: None }
    }

    pub fn failure(error: ClassifiedError) -> Self {
        Self {
            data: Value::Null,
            sources: Vec::new(),
            metadata: Value::Null,
            success: false,
            error: Some(error),
        }
    }
}
