//! Error types for the exam pipeline and question generators.
//!
//! `ProviderError` lives here rather than in `exampaper-providers` so the
//! engine can downcast generator failures and decide whether to retry
//! without string matching.

use thiserror::Error;

/// Errors that abort an exam request.
#[derive(Debug, Error)]
pub enum ExamError {
    /// The request itself is malformed (client error, never retried).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The topic graph or PYQ history is malformed (ingestion bug).
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    /// The topic graph reader could not be reached.
    #[error("topic graph unavailable: {0}")]
    GraphUnavailable(String),

    /// A configuration value is out of range.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ExamError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ExamError::InvalidRequest(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        ExamError::DataIntegrity(msg.into())
    }

    /// Returns `true` if the caller sent a bad request, as opposed to a
    /// server-side fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ExamError::InvalidRequest(_))
    }
}

/// Errors that can occur when asking a wording model for a question.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The model answered with nothing usable.
    #[error("model returned empty output")]
    EmptyOutput,
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_only_invalid_requests() {
        assert!(ExamError::invalid("total_questions must be positive").is_client_error());
        assert!(!ExamError::integrity("bad record").is_client_error());
        assert!(!ExamError::GraphUnavailable("down".into()).is_client_error());
    }

    #[test]
    fn permanent_provider_errors() {
        assert!(ProviderError::AuthenticationFailed("bad key".into()).is_permanent());
        assert!(ProviderError::ModelNotFound("llama".into()).is_permanent());
        assert!(!ProviderError::EmptyOutput.is_permanent());
        assert!(!ProviderError::Timeout(30).is_permanent());
    }

    #[test]
    fn retry_after_only_for_rate_limits() {
        let err = ProviderError::RateLimited {
            retry_after_ms: 5000,
        };
        assert_eq!(err.retry_after_ms(), Some(5000));
        assert_eq!(ProviderError::NetworkError("reset".into()).retry_after_ms(), None);
    }
}
