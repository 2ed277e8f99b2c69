use thiserror::Error;

/// Failures raised by an [`crate::sink::AuditSink`] implementation.
#[derive(Debug, Error)]
pub enum AuditSinkError {
    #[error("failed to write audit line: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize audit event: {0}")]
    Serialize(#[from] serde_json::Error),
}
