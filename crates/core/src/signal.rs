//! Signal classifications and per-agent verdicts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Five-level signal scale emitted by individual agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalLevel {
    StrongSell,
    Sell,
    Hold,
    Buy,
    StrongBuy,
}

impl SignalLevel {
    /// Maps a raw score in [-1, 1] onto the five-level scale using the
    /// configured cut points.
    #[must_use]
    pub fn from_score(score: f64, thresholds: &SignalThresholds) -> Self {
        if score >= thresholds.strong_cut {
            Self::StrongBuy
        } else if score >= thresholds.weak_cut {
            Self::Buy
        } else if score > -thresholds.weak_cut {
            Self::Hold
        } else if score > -thresholds.strong_cut {
            Self::Sell
        } else {
            Self::StrongSell
        }
    }

    /// Collapses the five-level scale into the three-level consensus type.
    #[must_use]
    pub fn collapse(self) -> SignalType {
        match self {
            Self::StrongBuy | Self::Buy => SignalType::Buy,
            Self::Hold => SignalType::Hold,
            Self::Sell | Self::StrongSell => SignalType::Sell,
        }
    }
}

impl fmt::Display for SignalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::StrongSell => "STRONG_SELL",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
            Self::Buy => "BUY",
            Self::StrongBuy => "STRONG_BUY",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for SignalLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STRONG_SELL" => Ok(Self::StrongSell),
            "SELL" => Ok(Self::Sell),
            "HOLD" => Ok(Self::Hold),
            "BUY" => Ok(Self::Buy),
            "STRONG_BUY" => Ok(Self::StrongBuy),
            other => Err(format!("unknown signal level: {other}")),
        }
    }
}

/// Three-level consensus classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    Buy,
    Sell,
    Hold,
}

impl SignalType {
    /// True for actionable (non-HOLD) signals.
    #[must_use]
    pub fn is_actionable(self) -> bool {
        !matches!(self, Self::Hold)
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for SignalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            "HOLD" => Ok(Self::Hold),
            other => Err(format!("unknown signal type: {other}")),
        }
    }
}

/// Directional recommendation returned by LLM analysts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Buy,
    Sell,
    Hold,
}

impl Recommendation {
    /// Sign of the recommendation: +1 for BUY, -1 for SELL, 0 for HOLD.
    #[must_use]
    pub fn direction(self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
            Self::Hold => 0.0,
        }
    }
}

/// Cut points for mapping scores onto signal levels.
///
/// Defaults match the current tuning (neutral zone ±0.1, strong zone ±0.5).
/// These are configuration, not constants; callers must not hardcode them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignalThresholds {
    /// |score| at or above this is STRONG_BUY / STRONG_SELL.
    pub strong_cut: f64,
    /// |score| at or above this is BUY / SELL; below is HOLD.
    pub weak_cut: f64,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            strong_cut: 0.5,
            weak_cut: 0.1,
        }
    }
}

/// One analyst's verdict for a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentVerdict {
    /// Unique agent name within the panel.
    pub agent_name: String,
    /// Five-level signal.
    pub signal: SignalLevel,
    /// Signed strength in [-1, 1].
    pub raw_score: f64,
    /// Conviction in [0, 1].
    pub confidence: f64,
    /// Free-text explanation; never empty when persisted.
    pub reasoning: String,
    /// Primary inputs the agent acted on, for audit. Ordered map so
    /// serialized verdicts are byte-stable.
    pub data_used: BTreeMap<String, f64>,
    /// True when analysis failed; implies HOLD with zero confidence.
    pub failed: bool,
}

impl AgentVerdict {
    /// Builds a verdict from a raw score, clamping into range and deriving
    /// the signal level from the thresholds.
    #[must_use]
    pub fn from_score(
        agent_name: impl Into<String>,
        score: f64,
        confidence: f64,
        reasoning: impl Into<String>,
        data_used: BTreeMap<String, f64>,
        thresholds: &SignalThresholds,
    ) -> Self {
        let score = score.clamp(-1.0, 1.0);
        Self {
            agent_name: agent_name.into(),
            signal: SignalLevel::from_score(score, thresholds),
            raw_score: score,
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
            data_used,
            failed: false,
        }
    }

    /// Builds the failed-analysis verdict: HOLD, zero confidence, with the
    /// reasoning prefixed `"Analysis failed: "`.
    #[must_use]
    pub fn failed(agent_name: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            agent_name: agent_name.into(),
            signal: SignalLevel::Hold,
            raw_score: 0.0,
            confidence: 0.0,
            reasoning: format!("Analysis failed: {reason}"),
            data_used: BTreeMap::new(),
            failed: true,
        }
    }
}
