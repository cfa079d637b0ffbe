//! Error taxonomy for the translation pipeline.
//!
//! Only [`QueueError`] and [`RateLimitError`] ever reach a caller; provider
//! failures are classified here and turned into a fallback by the orchestrator.

use std::time::Duration;
use thiserror::Error;

/// Failure reported by a [`TranslationProvider`](crate::provider::TranslationProvider).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request could not be sent or the connection dropped.
    #[error("network error talking to {provider}: {message}")]
    Network { provider: String, message: String },

    /// The provider did not answer within the configured timeout.
    #[error("{provider} did not respond within {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    /// Non-success HTTP status.
    #[error("{provider} returned HTTP {status}: {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("unexpected response from {provider}: {message}")]
    Parse { provider: String, message: String },

    /// The provider is missing credentials or is otherwise unusable.
    #[error("{provider} is not configured: {message}")]
    Unavailable { provider: String, message: String },
}

impl ProviderError {
    /// Whether another attempt has a reasonable chance of succeeding.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Parse { .. } | Self::Unavailable { .. } => false,
        }
    }

    pub(crate) fn from_reqwest(provider: &str, err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                provider: provider.to_string(),
                timeout,
            }
        } else if err.is_decode() {
            Self::Parse {
                provider: provider.to_string(),
                message: err.to_string(),
            }
        } else {
            Self::Network {
                provider: provider.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Failure settling a queued translation task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue was shut down before (or while) the task was accepted.
    #[error("translation queue is closed")]
    Closed,

    /// The task was removed from the queue before a worker picked it up.
    #[error("translation task was cancelled")]
    Cancelled,

    /// The worker running the task failed.
    #[error("translation task failed: {0}")]
    TaskFailed(String),
}

/// Failure of a bounded wait on the rate limiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("no rate limit token became available within {0:?}")]
    Timeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> ProviderError {
        ProviderError::Http {
            provider: "google".to_string(),
            status,
            body: String::new(),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(http(429).is_transient());
        assert!(http(503).is_transient());
        assert!(!http(400).is_transient());
        assert!(!http(401).is_transient());
        assert!(
            ProviderError::Timeout {
                provider: "gemini".to_string(),
                timeout: Duration::from_secs(10),
            }
            .is_transient()
        );
        assert!(
            !ProviderError::Parse {
                provider: "gemini".to_string(),
                message: "missing candidates".to_string(),
            }
            .is_transient()
        );
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(QueueError::Closed.to_string(), "translation queue is closed");
        assert!(http(502).to_string().contains("HTTP 502"));
    }
}
