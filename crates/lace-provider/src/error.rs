use thiserror::Error;

/// Structured error type for the provider boundary, mirroring the
/// teacher's `LLMError` / `AgentError` one-flat-enum convention.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum ProviderError {
    #[error("timed out waiting for provider response")]
    Timeout,

    #[error("rate limited{}", retry_after.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },

    #[error("provider server error: {0}")]
    ServerError(String),

    #[error("authentication failed: {0}")]
    AuthError(String),

    #[error("connection failed: {0}")]
    ConnectionError(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("invalid model spec: {0}")]
    InvalidModel(String),

    #[error("cancelled")]
    Cancelled,

    #[error("provider error: {0}")]
    Other(String),
}

/// The retry-relevant classification from §4.G / §7. `AuthError` is the one
/// variant that is never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Timeout,
    RateLimit,
    ServerError,
    AuthError,
    ConnectionError,
    NetworkError,
    /// Not one of the classified transient kinds; treated as fatal.
    Fatal,
}

impl ProviderError {
    pub fn classify(&self) -> ErrorClass {
        match self {
            ProviderError::Timeout => ErrorClass::Timeout,
            ProviderError::RateLimited { .. } => ErrorClass::RateLimit,
            ProviderError::ServerError(_) => ErrorClass::ServerError,
            ProviderError::AuthError(_) => ErrorClass::AuthError,
            ProviderError::ConnectionError(_) => ErrorClass::ConnectionError,
            ProviderError::NetworkError(_) => ErrorClass::NetworkError,
            ProviderError::InvalidModel(_) | ProviderError::Other(_) | ProviderError::Cancelled => {
                ErrorClass::Fatal
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(
            self.classify(),
            ErrorClass::AuthError | ErrorClass::Fatal
        )
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;
