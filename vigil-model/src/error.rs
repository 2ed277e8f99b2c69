use thiserror::Error;
use vigil_core::error::{ClassifiedError, ErrorKind};

/// Errors a concrete [`crate::provider::Llm`] implementation raises.
/// Variant choice doubles as the retry classification from spec.md
/// §4.3 step 3: `RateLimit | Timeout | Connection | Server5xx` are
/// retryable, `Auth | Client4xx` never are.
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    #[error("rate limited: {0}")]
    RateLimit(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("server error: {0}")]
    Server5xx(String),
    #[error("authentication error: {0}")]
    Auth(String),
    #[error("client error: {0}")]
    Client4xx(String),
    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Whether the gateway's retry loop (spec.md §4.3 step 3) may retry
    /// this failure when `gateway_retry_enabled` is set.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit(_) | Self::Timeout(_) | Self::Connection(_) | Self::Server5xx(_)
        )
    }
}

/// Errors the gateway's public surface (`invoke`/`embed`) raises.
/// Exactly the closed set named in spec.md §4.3.
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    #[error("model call timed out")]
    ModelTimeoutError,
    #[error("model authentication failed: {0}")]
    ModelAuthError(String),
    #[error("model rate limit exceeded")]
    ModelRateLimitError,
    #[error("model retries exhausted after {attempts} attempts: {last}")]
    ModelRetryExhaustedError { attempts: u32, last: String },
    #[error("circuit breaker open for model {0}")]
    CircuitBreakerOpenError(String),
    #[error("model provider error: {0}")]
    ModelProviderError(String),
    #[error("invalid gateway input: {0}")]
    InvalidInput(String),
}

impl GatewayError {
    pub fn classify(&self) -> ErrorKind {
        match self {
            Self::ModelTimeoutError => ErrorKind::ProviderTransient,
            Self::ModelAuthError(_) => ErrorKind::ProviderFatal,
            Self::ModelRateLimitError => ErrorKind::ProviderTransient,
            Self::ModelRetryExhaustedError { .. } => ErrorKind::ProviderTransient,
            Self::CircuitBreakerOpenError(_) => ErrorKind::CircuitOpen,
            Self::ModelProviderError(_) => ErrorKind::ProviderFatal,
            Self::InvalidInput(_) => ErrorKind::Validation,
        }
    }
}

impl From<GatewayError> for ClassifiedError {
    fn from(err: GatewayError) -> Self {
        let kind = err.classify();
        ClassifiedError::new(kind, err.to_string())
    }
}

impl From<ProviderError> for GatewayError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::RateLimit(_) => GatewayError::ModelRateLimitError,
            ProviderError::Timeout(_) => GatewayError::ModelTimeoutError,
            ProviderError::Auth(msg) => GatewayError::ModelAuthError(msg),
            other => GatewayError::ModelProviderError(other.to_string()),
        }
    }
}
