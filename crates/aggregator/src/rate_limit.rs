//! Vendor rate-limit enforcement.
//!
//! Each provider adapter owns one token bucket sized to its published limit.
//! Buckets are consulted without blocking: an empty bucket surfaces as a
//! transient `RateLimited` failure so the retry/breaker machinery handles it
//! instead of stalling the caller.

use crate::error::ProviderError;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use std::sync::Arc;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket for one provider.
#[derive(Clone)]
pub struct ProviderLimiter {
    limiter: Arc<DirectLimiter>,
}

impl ProviderLimiter {
    /// Creates a limiter allowing `per_minute` requests per minute.
    /// Zero is coerced to one request per minute.
    #[must_use]
    pub fn per_minute(per_minute: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(nonzero!(1u32)));
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Consumes one token if available.
    ///
    /// # Errors
    /// Returns `ProviderError::RateLimited` when the bucket is empty.
    pub fn acquire(&self) -> Result<(), ProviderError> {
        self.limiter
            .check()
            .map_err(|_| ProviderError::RateLimited)
    }
}

impl std::fmt::Debug for ProviderLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderLimiter").finish_non_exhaustive()
    }
}
