use thiserror::Error;
use vigil_core::error::{ClassifiedError, ErrorKind};

/// Failures raised by [`crate::service::RetrievalService`] (spec.md §4.4).
#[derive(Debug, Error, Clone)]
pub enum RetrievalError {
    #[error("vector index unavailable: {0}")]
    RetrievalUnavailableError(String),
    #[error("invalid query: {0}")]
    RetrievalInvalidQuery(String),
}

impl RetrievalError {
    pub fn classify(&self) -> ErrorKind {
        match self {
            Self::RetrievalUnavailableError(_) => ErrorKind::ProviderTransient,
            Self::RetrievalInvalidQuery(_) => ErrorKind::Validation,
        }
    }
}

impl From<RetrievalError> for ClassifiedError {
    fn from(err: RetrievalError) -> Self {
        let kind = err.classify();
        ClassifiedError::new(kind, err.to_string())
    }
}
