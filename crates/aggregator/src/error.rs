//! Provider-level failures.
//!
//! The transient/non-transient split here is what the retry loop and the
//! circuit breakers act on; messages are for logs only.

use thiserror::Error;

/// A failure from one provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Non-2xx HTTP response.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The call exceeded its deadline.
    #[error("request timed out")]
    Timeout,

    /// The provider (or our own token bucket) refused the call.
    #[error("rate limited")]
    RateLimited,

    /// The response arrived but could not be interpreted.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Circuit breaker for this provider is open.
    #[error("circuit breaker open for {provider}")]
    BreakerOpen { provider: String },

    /// No API key configured for this provider.
    #[error("{provider} API key not configured")]
    NotConfigured { provider: String },
}

impl ProviderError {
    /// True for failure classes that retry-with-backoff may resolve:
    /// network errors, timeouts, HTTP 429, and HTTP 5xx. Everything else
    /// fails immediately and moves the chain to the next provider.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Malformed(_) | Self::BreakerOpen { .. } | Self::NotConfigured { .. } => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}
