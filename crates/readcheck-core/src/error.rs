//! Error types for the assessment pipeline.
//!
//! `ProviderError` lives here rather than in `readcheck-providers` so the
//! adapters can downcast and classify failures for retry decisions and
//! grade tagging without string matching.

use thiserror::Error;

/// Errors that can occur when interacting with an LLM provider.
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
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        match self {
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_) => true,
            ProviderError::ApiError { status, .. } => (400..500).contains(status),
            _ => false,
        }
    }

    /// Returns `true` if the service could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_)
                | ProviderError::NetworkError(_)
                | ProviderError::AuthenticationFailed(_)
                | ProviderError::RateLimited { .. }
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

/// Failures of the passage source.
#[derive(Debug, Error)]
pub enum PassageError {
    #[error("passage not found: {0}")]
    NotFound(String),

    #[error("passage library is empty")]
    EmptyLibrary,

    #[error("passage must be at least {min} characters, got {actual}")]
    TooShort { min: usize, actual: usize },
}

/// Failures of the question generation adapter. Generation is all-or-nothing:
/// no variant carries partial results.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("passage is empty")]
    EmptyPassage,

    #[error("question service failed: {0}")]
    Remote(String),

    #[error("question service returned unparseable data: {0}")]
    Malformed(String),

    #[error("expected {expected} questions, got {actual}")]
    WrongCount { expected: usize, actual: usize },
}

/// Batch-level grading failures. Individual answer failures never surface
/// here; they become zero-score grades.
#[derive(Debug, Error)]
pub enum GradingError {
    #[error("grading service unreachable: {0}")]
    ServiceUnreachable(String),

    #[error("expected {expected} answers, got {actual}")]
    AnswerCountMismatch { expected: usize, actual: usize },

    #[error("answer refers to unknown question {0}")]
    UnknownQuestion(u32),

    #[error("question {0} has more than one answer")]
    DuplicateAnswer(u32),
}

/// Events rejected by the state machine before any transition takes place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("answer is empty")]
    EmptyAnswer,

    #[error("not awaiting an answer (current phase: {0})")]
    NotAwaitingAnswer(String),

    #[error("no assessment is loaded")]
    NoActiveSession,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_errors_are_not_retried() {
        assert!(ProviderError::AuthenticationFailed("bad key".into()).is_permanent());
        assert!(ProviderError::ModelNotFound("gpt-x".into()).is_permanent());
        assert!(ProviderError::ApiError {
            status: 400,
            message: "bad request".into()
        }
        .is_permanent());
        assert!(!ProviderError::ApiError {
            status: 503,
            message: "overloaded".into()
        }
        .is_permanent());
        assert!(!ProviderError::Timeout(30).is_permanent());
    }

    #[test]
    fn unreachable_classification() {
        assert!(ProviderError::NetworkError("connection refused".into()).is_unreachable());
        assert!(ProviderError::Timeout(30).is_unreachable());
        assert!(!ProviderError::ApiError {
            status: 500,
            message: "oops".into()
        }
        .is_unreachable());
    }

    #[test]
    fn retry_after_only_for_rate_limits() {
        assert_eq!(
            ProviderError::RateLimited {
                retry_after_ms: 2000
            }
            .retry_after_ms(),
            Some(2000)
        );
        assert_eq!(ProviderError::Timeout(5).retry_after_ms(), None);
    }
}
