use thiserror::Error;

/// Errors surfaced by a checker provider. Any of them fails the run for one
/// channel only; previously merged suggestions are left alone.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Transport-level failure (connect, DNS, reset).
    #[error("http request failed: {0}")]
    Http(String),
    /// The provider answered with a non-success status.
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// The response body could not be decoded.
    #[error("invalid provider response: {0}")]
    Parse(String),
    /// The call did not complete within its deadline.
    #[error("provider call timed out after {0} ms")]
    Timeout(u64),
    /// The circuit breaker for this provider is open.
    #[error("circuit breaker is open for provider '{0}'")]
    CircuitOpen(String),
    /// No rate-limit token became available in time.
    #[error("rate limit exceeded for provider '{0}'")]
    RateLimited(String),
    /// Provider configuration is inconsistent (missing url, unknown kind).
    #[error("invalid provider config: {0}")]
    InvalidConfig(String),
}

impl ProviderError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http(_) | ProviderError::Timeout(_) => true,
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
