//! Error taxonomy for identification requests.
//!
//! Two families: classification errors never reach the model and are
//! surfaced synchronously before any stream opens; model-call failures
//! happen mid-stream and always still end with a `done` event. Only
//! model-call failures carry a meaningful retryable flag.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifyError {
    #[error("Invalid input: {0}")]
    Classification(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Model provider timed out: {0}")]
    Timeout(String),

    #[error("Model provider rate limited: {0}")]
    RateLimit(String),

    #[error("Model provider server error: {0}")]
    Server(String),

    #[error("Model provider overloaded: {0}")]
    Overloaded(String),

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl IdentifyError {
    /// Wire-format kind string
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Classification(_) => "classification_error",
            Self::Processing(_) => "processing_error",
            Self::Timeout(_) => "timeout",
            Self::RateLimit(_) => "rate_limit",
            Self::Server(_) => "server_error",
            Self::Overloaded(_) => "overloaded",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Retry policy: only transient provider failures are retryable.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::RateLimit(_) | Self::Server(_) | Self::Overloaded(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_policy() {
        assert!(IdentifyError::Timeout("t".into()).retryable());
        assert!(IdentifyError::RateLimit("r".into()).retryable());
        assert!(IdentifyError::Server("s".into()).retryable());
        assert!(IdentifyError::Overloaded("o".into()).retryable());
        assert!(!IdentifyError::Classification("c".into()).retryable());
        assert!(!IdentifyError::Processing("p".into()).retryable());
        assert!(!IdentifyError::Unknown("u".into()).retryable());
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(
            IdentifyError::Classification("x".into()).kind(),
            "classification_error"
        );
        assert_eq!(IdentifyError::RateLimit("x".into()).kind(), "rate_limit");
    }
}
