//! The persisted consensus verdict and its status lifecycle.

use crate::error::EngineError;
use crate::signal::{AgentVerdict, SignalType};
use crate::ticker::Ticker;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Linear, monotonic verdict lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStatus {
    Pending,
    Approved,
    Executed,
    Closed,
}

impl SignalStatus {
    /// Checks a proposed transition. The lifecycle only moves forward one
    /// step at a time; everything else (including repeating the current
    /// status) is rejected.
    ///
    /// # Errors
    /// Returns `EngineError::InvalidState` for any transition other than
    /// PENDING -> APPROVED -> EXECUTED -> CLOSED.
    pub fn transition_to(self, next: Self) -> Result<Self, EngineError> {
        let legal = matches!(
            (self, next),
            (Self::Pending, Self::Approved)
                | (Self::Approved, Self::Executed)
                | (Self::Executed, Self::Closed)
        );
        if legal {
            Ok(next)
        } else {
            Err(EngineError::InvalidState(format!(
                "illegal status transition {self} -> {next}"
            )))
        }
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Executed => "EXECUTED",
            Self::Closed => "CLOSED",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for SignalStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "APPROVED" => Ok(Self::Approved),
            "EXECUTED" => Ok(Self::Executed),
            "CLOSED" => Ok(Self::Closed),
            other => Err(EngineError::BadInput(format!("unknown status: {other}"))),
        }
    }
}

/// The consensus output persisted for review and backtesting.
///
/// Invariants (enforced at construction sites, checked in tests):
/// - `confidence` in [0, 1]; `signal_type` one of BUY/SELL/HOLD
/// - `position_size == 0` iff `signal_type == HOLD`
/// - for BUY: `stop_loss < entry_price < target_price`; mirrored for SELL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// Assigned by persistence; `None` before the first save.
    pub id: Option<i64>,
    pub ticker: Ticker,
    pub created_at: DateTime<Utc>,
    pub signal_type: SignalType,
    pub confidence: f64,
    /// Quote at decision time; absent when the whole quote chain failed
    /// (in which case the verdict is a forced HOLD).
    pub entry_price: Option<Decimal>,
    /// Present iff `signal_type != HOLD`.
    pub stop_loss: Option<Decimal>,
    /// Present iff `signal_type != HOLD`.
    pub target_price: Option<Decimal>,
    /// Whole shares; zero iff HOLD.
    pub position_size: i64,
    pub status: SignalStatus,
    /// Realised P&L, attached at or after CLOSED.
    pub pnl: Option<Decimal>,
    pub notes: Option<String>,
    /// One entry per panel member, in panel registration order.
    pub agent_verdicts: Vec<AgentVerdict>,
}

impl Verdict {
    /// Expected return from entry to target, as a decimal fraction.
    /// `None` for HOLD verdicts or when prices are missing.
    #[must_use]
    pub fn expected_return(&self) -> Option<Decimal> {
        let entry = self.entry_price?;
        let target = self.target_price?;
        if entry <= Decimal::ZERO {
            return None;
        }
        Some((target - entry) / entry)
    }

    /// Downside risk from entry to stop, as a decimal fraction.
    #[must_use]
    pub fn risk_factor(&self) -> Option<Decimal> {
        let entry = self.entry_price?;
        let stop = self.stop_loss?;
        if entry <= Decimal::ZERO {
            return None;
        }
        Some((entry - stop) / entry)
    }

    /// Names of the agents whose analysis succeeded for this verdict.
    pub fn contributing_agents(&self) -> impl Iterator<Item = &str> {
        self.agent_verdicts
            .iter()
            .filter(|v| !v.failed)
            .map(|v| v.agent_name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn lifecycle_moves_forward_only() {
        assert_eq!(
            SignalStatus::Pending
                .transition_to(SignalStatus::Approved)
                .unwrap(),
            SignalStatus::Approved
        );
        assert_eq!(
            SignalStatus::Approved
                .transition_to(SignalStatus::Executed)
                .unwrap(),
            SignalStatus::Executed
        );
        assert_eq!(
            SignalStatus::Executed
                .transition_to(SignalStatus::Closed)
                .unwrap(),
            SignalStatus::Closed
        );
    }

    #[test]
    fn skipping_a_step_is_rejected() {
        assert!(SignalStatus::Pending
            .transition_to(SignalStatus::Executed)
            .is_err());
        assert!(SignalStatus::Pending
            .transition_to(SignalStatus::Closed)
            .is_err());
    }

    #[test]
    fn moving_backwards_is_rejected() {
        assert!(SignalStatus::Closed
            .transition_to(SignalStatus::Pending)
            .is_err());
        assert!(SignalStatus::Executed
            .transition_to(SignalStatus::Approved)
            .is_err());
    }

    #[test]
    fn repeating_a_transition_is_rejected() {
        // Applying the same legal transition twice must fail the second time,
        // not silently no-op.
        let status = SignalStatus::Pending
            .transition_to(SignalStatus::Approved)
            .unwrap();
        assert!(matches!(
            status.transition_to(SignalStatus::Approved),
            Err(EngineError::InvalidState(_))
        ));
    }

    fn buy_verdict() -> Verdict {
        Verdict {
            id: None,
            ticker: Ticker::parse("NVDA").unwrap(),
            created_at: Utc::now(),
            signal_type: SignalType::Buy,
            confidence: 0.7,
            entry_price: Some(dec!(150.00)),
            stop_loss: Some(dec!(135.00)),
            target_price: Some(dec!(187.50)),
            position_size: 23,
            status: SignalStatus::Pending,
            pnl: None,
            notes: None,
            agent_verdicts: vec![],
        }
    }

    #[test]
    fn expected_return_and_risk_factor() {
        let verdict = buy_verdict();
        assert_eq!(verdict.expected_return(), Some(dec!(0.25)));
        assert_eq!(verdict.risk_factor(), Some(dec!(0.10)));
    }

    #[test]
    fn expected_return_absent_without_prices() {
        let mut verdict = buy_verdict();
        verdict.entry_price = None;
        assert!(verdict.expected_return().is_none());
        assert!(verdict.risk_factor().is_none());
    }

    #[test]
    fn contributing_agents_skips_failures() {
        let mut verdict = buy_verdict();
        verdict.agent_verdicts = vec![
            AgentVerdict::failed("contrarian", "timeout"),
            AgentVerdict::from_score(
                "predictor",
                0.4,
                0.6,
                "rule hit",
                Default::default(),
                &crate::signal::SignalThresholds::default(),
            ),
        ];
        let names: Vec<_> = verdict.contributing_agents().collect();
        assert_eq!(names, vec!["predictor"]);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!(
            "closed".parse::<SignalStatus>().unwrap(),
            SignalStatus::Closed
        );
        assert!("SETTLED".parse::<SignalStatus>().is_err());
    }
}
