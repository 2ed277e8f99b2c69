use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of error kinds that may cross a public API or agent
/// boundary (see the error taxonomy in the design docs). Every failure
/// that escapes a component other than a fatal startup error is
/// classified into exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    ProviderTransient,
    ProviderFatal,
    CircuitOpen,
    Data,
    SchemaViolation,
    Cancelled,
    Internal,
}

/// A classified, user-safe error: a `kind` from the closed set plus a
/// message that never contains a stack trace, a prompt, or a response
/// body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ClassifiedError {}

/// Errors raised by the core crate itself: configuration loading and
/// data-model validation (e.g. a malformed `Citation`).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("missing required environment variable: {0}")]
    MissingRequiredEnv(String),

    #[error("invalid citation: {0}")]
    InvalidCitation(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
