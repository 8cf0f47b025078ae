//! Per-provider circuit breakers.
//!
//! Closed -> open after N consecutive failures inside a rolling window;
//! open -> half-open after a cooldown; a single probe call decides whether
//! the breaker closes again or re-opens. While open, calls short-circuit
//! without touching the network.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stocksense_core::BreakerConfig;
use tracing::{info, warn};

#[derive(Debug)]
enum BreakerState {
    Closed {
        failures: u32,
        window_start: Option<Instant>,
    },
    Open {
        opened_at: Instant,
    },
    /// One probe is in flight; further calls are refused until it reports.
    HalfOpen,
}

/// Circuit breaker guarding one provider.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    window: Duration,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(name: impl Into<String>, config: &BreakerConfig) -> Self {
        Self {
            name: name.into(),
            failure_threshold: config.failure_threshold.max(1),
            window: Duration::from_secs(config.window_secs),
            cooldown: Duration::from_secs(config.cooldown_secs),
            state: Mutex::new(BreakerState::Closed {
                failures: 0,
                window_start: None,
            }),
        }
    }

    /// Whether a call may proceed. When the cooldown of an open breaker has
    /// elapsed this admits exactly one probe call (half-open); concurrent
    /// callers keep getting refused until the probe reports back.
    #[must_use]
    pub fn can_execute(&self) -> bool {
        let mut state = self.state.lock();
        match &*state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { opened_at } => {
                if opened_at.elapsed() >= self.cooldown {
                    info!(breaker = %self.name, "cooldown elapsed, admitting probe");
                    *state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => false,
        }
    }

    /// Records a successful call: closes the breaker and clears the window.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if matches!(*state, BreakerState::HalfOpen | BreakerState::Open { .. }) {
            info!(breaker = %self.name, "probe succeeded, closing");
        }
        *state = BreakerState::Closed {
            failures: 0,
            window_start: None,
        };
    }

    /// Records a failed call. A failed probe re-opens immediately; in the
    /// closed state failures accumulate within the window and open the
    /// breaker at the threshold.
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        match &mut *state {
            BreakerState::HalfOpen => {
                warn!(breaker = %self.name, "probe failed, re-opening");
                *state = BreakerState::Open {
                    opened_at: Instant::now(),
                };
            }
            BreakerState::Open { .. } => {}
            BreakerState::Closed {
                failures,
                window_start,
            } => {
                let now = Instant::now();
                match window_start {
                    Some(start) if now.duration_since(*start) <= self.window => {}
                    _ => {
                        // Window expired or first failure: start counting anew.
                        *window_start = Some(now);
                        *failures = 0;
                    }
                }
                *failures += 1;
                if *failures >= self.failure_threshold {
                    warn!(
                        breaker = %self.name,
                        failures = *failures,
                        "failure threshold reached, opening"
                    );
                    *state = BreakerState::Open { opened_at: now };
                }
            }
        }
    }

    /// Current consecutive-failure count (0 unless closed).
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        match &*self.state.lock() {
            BreakerState::Closed { failures, .. } => *failures,
            _ => 0,
        }
    }

    /// True while the breaker refuses calls outright.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(&*self.state.lock(), BreakerState::Open { opened_at } if opened_at.elapsed() < self.cooldown)
    }
}

/// Process-wide registry of breakers, one per provider name.
///
/// The registry and the cache are the only legitimate shared mutable state
/// in the engine; both are internally synchronized.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the breaker for `name`, creating it with `config` on first use.
    #[must_use]
    pub fn get(&self, name: &str, config: &BreakerConfig) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: u32, window_secs: u64, cooldown_secs: u64) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: threshold,
            window_secs,
            cooldown_secs,
        }
    }

    #[test]
    fn starts_closed() {
        let breaker = CircuitBreaker::new("polygon", &config(5, 60, 30));
        assert!(breaker.can_execute());
        assert!(!breaker.is_open());
    }

    #[test]
    fn opens_at_failure_threshold() {
        let breaker = CircuitBreaker::new("polygon", &config(3, 60, 30));
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.can_execute());
        breaker.record_failure();
        assert!(!breaker.can_execute());
        assert!(breaker.is_open());
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new("polygon", &config(3, 60, 30));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.failure_count(), 0);
        breaker.record_failure();
        assert!(breaker.can_execute());
    }

    #[test]
    fn half_open_admits_single_probe() {
        let breaker = CircuitBreaker::new("polygon", &config(1, 60, 0));
        breaker.record_failure();
        // Cooldown of zero: first check becomes the probe, second is refused.
        assert!(breaker.can_execute());
        assert!(!breaker.can_execute());
    }

    #[test]
    fn probe_success_closes() {
        let breaker = CircuitBreaker::new("polygon", &config(1, 60, 0));
        breaker.record_failure();
        assert!(breaker.can_execute());
        breaker.record_success();
        assert!(breaker.can_execute());
        assert!(breaker.can_execute());
    }

    #[test]
    fn probe_failure_reopens() {
        let breaker = CircuitBreaker::new("polygon", &config(1, 60, 30));
        breaker.record_failure();
        // Force the probe by using a zero-cooldown sibling breaker instead:
        // with a 30s cooldown the breaker must still be refusing.
        assert!(!breaker.can_execute());

        let breaker = CircuitBreaker::new("polygon", &config(1, 60, 0));
        breaker.record_failure();
        assert!(breaker.can_execute());
        breaker.record_failure();
        assert!(breaker.is_open());
    }

    #[test]
    fn window_expiry_restarts_the_count() {
        let breaker = CircuitBreaker::new("polygon", &config(2, 0, 30));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        // Window (0s) has expired, so this failure starts a fresh count
        // rather than reaching the threshold.
        breaker.record_failure();
        assert!(breaker.can_execute());
    }

    #[test]
    fn registry_returns_same_breaker_per_name() {
        let registry = BreakerRegistry::new();
        let config = config(5, 60, 30);
        let a = registry.get("polygon", &config);
        let b = registry.get("polygon", &config);
        a.record_failure();
        assert_eq!(b.failure_count(), 1);

        let other = registry.get("finnhub", &config);
        assert_eq!(other.failure_count(), 0);
    }
}
