//! Error taxonomy for the signal engine.
//!
//! The kinds here drive control flow: retries and breaker logic consume
//! `Transient`, chain fallback consumes `Unavailable`, the operation surface
//! maps `BadInput`/`InvalidState` to caller errors, and only `Fatal`
//! propagates out of the core unchanged.

use thiserror::Error;

/// Top-level engine errors, one variant per failure kind.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller-supplied value violates a precondition. Never retried.
    #[error("bad input: {0}")]
    BadInput(String),

    /// Network error, timeout, HTTP 429/5xx, or rate-limit refusal.
    /// Eligible for retry with backoff.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Circuit breaker open or an entire provider chain exhausted with no
    /// usable cache. Reported as a missing snapshot field, not an abort.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// State-machine violation (illegal status transition, backtest over an
    /// empty selection).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Programmer error or data-store corruption. Surfaced unchanged.
    #[error("fatal: {0}")]
    Fatal(anyhow::Error),
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Fatal(err)
    }
}

impl EngineError {
    /// True for failures that retry-with-backoff may resolve.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_is_retryable() {
        assert!(EngineError::Transient("timeout".into()).is_transient());
        assert!(!EngineError::BadInput("x".into()).is_transient());
        assert!(!EngineError::Unavailable("x".into()).is_transient());
        assert!(!EngineError::InvalidState("x".into()).is_transient());
    }

    #[test]
    fn display_includes_kind() {
        let err = EngineError::InvalidState("CLOSED -> PENDING".into());
        assert!(err.to_string().contains("invalid state"));
        assert!(err.to_string().contains("CLOSED -> PENDING"));
    }
}
