use thiserror::Error;
use vigil_core::error::{ClassifiedError, ErrorKind};
use vigil_model::error::GatewayError;
use vigil_retrieval::error::RetrievalError;

/// Failures raised inside a specialist agent before it folds the
/// failure into an `AgentResult{success: false}` (spec.md §4.6, §7).
#[derive(Debug, Error, Clone)]
pub enum AgentError {
    #[error("invalid agent input: {0}")]
    InvalidInput(String),
    #[error("sql execution failed: {0}")]
    SqlExecutionError(String),
    #[error(transparent)]
    Model(#[from] GatewayError),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error("schema violation: {0}")]
    SchemaViolation(String),
}

impl AgentError {
    pub fn classify(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::Validation,
            Self::SqlExecutionError(_) => ErrorKind::Data,
            Self::Model(err) => err.classify(),
            Self::Retrieval(err) => err.classify(),
            Self::SchemaViolation(_) => ErrorKind::SchemaViolation,
        }
    }
}

impl From<AgentError> for ClassifiedError {
    fn from(err: AgentError) -> Self {
        let kind = err.classify();
        ClassifiedError::new(kind, err.to_string())
    }
}
