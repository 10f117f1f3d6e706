//! Client-side fault taxonomy.
//!
//! Every handler failure funnels through the error-handling middleware
//! as a `Fault`, which knows how to present itself to the user. The
//! server's typed errors pass through unchanged inside `Api`.

use somm_common::IdentifyError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Fault {
    /// An action's prerequisites were not met (strict validator mode)
    #[error("Action not allowed: {0}")]
    Validation(String),

    /// The daemon rejected or failed the request with a typed error
    #[error("{0}")]
    Api(IdentifyError),

    /// Could not reach the daemon at all
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Anything else
    #[error("Unexpected failure: {0}")]
    Unknown(String),
}

impl Fault {
    /// Canned user-facing message for the transcript
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(_) => "Sorry, I can't do that right now.".to_string(),
            Self::Api(err) => match err {
                IdentifyError::Classification(msg) => {
                    format!("I couldn't work with that input: {}", msg)
                }
                IdentifyError::Timeout(_) => {
                    "That took longer than expected. Want to try again?".to_string()
                }
                IdentifyError::RateLimit(_) => {
                    "I'm handling a lot of requests right now. Give me a moment, then retry."
                        .to_string()
                }
                IdentifyError::Server(_) | IdentifyError::Overloaded(_) => {
                    "The sommelier service hit a snag. It's usually temporary.".to_string()
                }
                IdentifyError::Processing(_) | IdentifyError::Unknown(_) => {
                    "Something went wrong while identifying that wine.".to_string()
                }
            },
            Self::Connection(_) => {
                "I couldn't reach the sommelier service. Is the daemon running?".to_string()
            }
            Self::Unknown(_) => "Something unexpected went wrong.".to_string(),
        }
    }

    /// Whether offering a retry affordance makes sense
    pub fn retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Api(err) => err.retryable(),
            Self::Connection(_) => true,
            Self::Unknown(_) => false,
        }
    }

    /// Wire-compatible kind string, mirrors the server taxonomy
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "classification_error",
            Self::Api(err) => err.kind(),
            Self::Connection(_) => "server_error",
            Self::Unknown(_) => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_follows_server_policy() {
        assert!(Fault::Api(IdentifyError::Timeout("t".into())).retryable());
        assert!(Fault::Connection("refused".into()).retryable());
        assert!(!Fault::Validation("nope".into()).retryable());
        assert!(!Fault::Api(IdentifyError::Classification("short".into())).retryable());
    }

    #[test]
    fn test_canned_messages_are_user_facing() {
        let fault = Fault::Api(IdentifyError::RateLimit("429".into()));
        assert!(!fault.user_message().contains("429"));
    }
}
