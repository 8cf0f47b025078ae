//! Consensus engine: weighted agent votes into one persisted verdict.
//!
//! Pure computation. Given identical inputs the verdict is identical; the
//! only nondeterminism (timestamps) is supplied by the caller.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use stocksense_core::{
    AgentVerdict, ConsensusConfig, RiskConfig, SignalStatus, SignalType, Ticker, Verdict,
};
use tracing::debug;

/// Combines agent verdicts into a final signal with risk and sizing.
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    config: ConsensusConfig,
    risk: RiskConfig,
}

impl ConsensusEngine {
    #[must_use]
    pub fn new(config: ConsensusConfig, risk: RiskConfig) -> Self {
        Self { config, risk }
    }

    /// Produces the consensus verdict.
    ///
    /// `weights` maps agent name to consensus weight; unknown names weigh
    /// 1.0. `agent_verdicts` must be in panel registration order; it is
    /// preserved verbatim on the verdict.
    #[must_use]
    pub fn decide(
        &self,
        ticker: &Ticker,
        created_at: DateTime<Utc>,
        entry_price: Option<Decimal>,
        agent_verdicts: Vec<AgentVerdict>,
        weights: &BTreeMap<String, f64>,
    ) -> Verdict {
        let active: Vec<(&AgentVerdict, f64)> = agent_verdicts
            .iter()
            .filter(|v| !v.failed)
            .map(|v| (v, weights.get(&v.agent_name).copied().unwrap_or(1.0)))
            .collect();

        let blend = Self::blend(&active);
        let agreement = Self::agreement_ratio(&active);

        let tie = blend.positive_mass > 0.0
            && blend.negative_mass > 0.0
            && (blend.positive_mass - blend.negative_mass).abs() <= self.config.tie_epsilon;

        let (signal_type, confidence) = if active.is_empty() {
            (SignalType::Hold, 0.0)
        } else if tie {
            // A true split carries no direction; conviction is whatever the
            // agreement ratio says (at most one half on an even split).
            (SignalType::Hold, agreement)
        } else {
            let cut = self.config.thresholds.weak_cut;
            let signal = if blend.score >= cut {
                SignalType::Buy
            } else if blend.score <= -cut {
                SignalType::Sell
            } else {
                SignalType::Hold
            };
            let confidence = (0.5 * blend.score.abs() + 0.5 * agreement).clamp(0.0, 1.0);
            (signal, confidence)
        };

        // An actionable signal needs a price for stops, targets, and sizing,
        // and a position of at least one whole share. Anything less is a
        // HOLD in practice, so it is recorded as one.
        let priced_entry = entry_price.filter(|p| *p > Decimal::ZERO);
        let unpriced = signal_type.is_actionable() && priced_entry.is_none();
        let mut signal_type = if unpriced { SignalType::Hold } else { signal_type };

        let position_size = if signal_type.is_actionable() {
            priced_entry.map_or(0, |entry| self.position_size(entry, confidence))
        } else {
            0
        };
        let r#unsized = signal_type.is_actionable() && position_size == 0;
        if r#unsized {
            signal_type = SignalType::Hold;
        }

        let (stop_loss, target_price) = match (signal_type, priced_entry) {
            (SignalType::Buy, Some(entry)) => (
                Some((entry * (Decimal::ONE - self.risk.stop_loss_pct)).round_dp(2)),
                Some((entry * (Decimal::ONE + self.risk.target_pct)).round_dp(2)),
            ),
            (SignalType::Sell, Some(entry)) => (
                Some((entry * (Decimal::ONE + self.risk.stop_loss_pct)).round_dp(2)),
                Some((entry * (Decimal::ONE - self.risk.target_pct)).round_dp(2)),
            ),
            _ => (None, None),
        };

        let mut notes = Self::summarize(&agent_verdicts, agreement);
        if unpriced {
            notes.push_str("; downgraded to HOLD (quote unavailable)");
        } else if r#unsized {
            notes.push_str("; downgraded to HOLD (position rounds to zero shares)");
        }

        debug!(
            %ticker,
            blended = blend.score,
            agreement,
            %signal_type,
            confidence,
            position_size,
            "consensus decided"
        );

        Verdict {
            id: None,
            ticker: ticker.clone(),
            created_at,
            signal_type,
            confidence,
            entry_price,
            stop_loss,
            target_price,
            position_size,
            status: SignalStatus::Pending,
            pnl: None,
            notes: Some(notes),
            agent_verdicts,
        }
    }

    fn blend(active: &[(&AgentVerdict, f64)]) -> Blend {
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        let mut positive_mass = 0.0;
        let mut negative_mass = 0.0;

        for (verdict, weight) in active {
            let mass = weight * verdict.confidence;
            let contribution = mass * verdict.raw_score;
            weighted_sum += contribution;
            weight_total += mass;
            if contribution > 0.0 {
                positive_mass += contribution;
            } else {
                negative_mass -= contribution;
            }
        }

        Blend {
            score: if weight_total > 0.0 {
                weighted_sum / weight_total
            } else {
                0.0
            },
            positive_mass,
            negative_mass,
        }
    }

    /// Fraction of non-failed agents sharing the majority direction among
    /// positive, negative, and zero raw scores.
    fn agreement_ratio(active: &[(&AgentVerdict, f64)]) -> f64 {
        if active.is_empty() {
            return 0.0;
        }
        let positive = active.iter().filter(|(v, _)| v.raw_score > 0.0).count();
        let negative = active.iter().filter(|(v, _)| v.raw_score < 0.0).count();
        let zero = active.len() - positive - negative;
        positive.max(negative).max(zero) as f64 / active.len() as f64
    }

    fn position_size(&self, entry: Decimal, confidence: f64) -> i64 {
        let Some(confidence) = Decimal::from_f64(confidence) else {
            return 0;
        };
        let scaled = self.risk.capital * self.risk.max_position_pct * confidence;
        (scaled / entry).floor().to_i64().unwrap_or(0).max(0)
    }

    fn summarize(verdicts: &[AgentVerdict], agreement: f64) -> String {
        let bullish = verdicts
            .iter()
            .filter(|v| !v.failed && v.raw_score > 0.0)
            .count();
        let bearish = verdicts
            .iter()
            .filter(|v| !v.failed && v.raw_score < 0.0)
            .count();
        let failed = verdicts.iter().filter(|v| v.failed).count();

        let mut parts = vec![format!("{:.0}% agreement", agreement * 100.0)];
        if bullish > 0 {
            parts.push(format!("{bullish} bullish"));
        }
        if bearish > 0 {
            parts.push(format!("{bearish} bearish"));
        }
        if failed > 0 {
            parts.push(format!("{failed} failed"));
        }
        parts.join(", ")
    }
}

struct Blend {
    score: f64,
    positive_mass: f64,
    negative_mass: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use stocksense_core::SignalThresholds;

    fn engine() -> ConsensusEngine {
        ConsensusEngine::new(ConsensusConfig::default(), RiskConfig::default())
    }

    fn ticker() -> Ticker {
        Ticker::parse("NVDA").unwrap()
    }

    fn verdict(name: &str, score: f64, confidence: f64) -> AgentVerdict {
        AgentVerdict::from_score(
            name,
            score,
            confidence,
            format!("{name} call"),
            BTreeMap::new(),
            &SignalThresholds::default(),
        )
    }

    fn unit_weights() -> BTreeMap<String, f64> {
        BTreeMap::new()
    }

    #[test]
    fn oversold_contrarian_buy_scenario() {
        let verdicts = vec![
            verdict("contrarian", 0.8, 0.8),
            verdict("predictor", 0.6, 0.6),
            verdict("growth", 0.0, 0.2),
            verdict("multimodal", 0.7, 0.7),
        ];

        let result = engine().decide(
            &ticker(),
            Utc::now(),
            Some(dec!(150.00)),
            verdicts,
            &unit_weights(),
        );

        assert_eq!(result.signal_type, SignalType::Buy);
        assert!(result.confidence >= 0.6, "confidence {}", result.confidence);
        assert_eq!(result.entry_price, Some(dec!(150.00)));
        assert_eq!(result.stop_loss, Some(dec!(135.00)));
        assert_eq!(result.target_price, Some(dec!(187.50)));
        // floor(50000 * 0.10 * confidence / 150)
        let expected = (5_000.0 * result.confidence / 150.0).floor() as i64;
        assert_eq!(result.position_size, expected);
        assert_eq!(result.position_size, 23);
        assert_eq!(result.status, SignalStatus::Pending);
        assert_eq!(result.agent_verdicts.len(), 4);
    }

    #[test]
    fn overbought_sell_scenario() {
        let verdicts = vec![
            verdict("contrarian", -0.7, 0.7),
            verdict("growth", -0.6, 0.6),
            verdict("multimodal", -0.6, 0.6),
            verdict("predictor", 0.0, 0.3),
        ];

        let result = engine().decide(
            &ticker(),
            Utc::now(),
            Some(dec!(200.00)),
            verdicts,
            &unit_weights(),
        );

        assert_eq!(result.signal_type, SignalType::Sell);
        assert_eq!(result.stop_loss, Some(dec!(220.00)));
        assert_eq!(result.target_price, Some(dec!(150.00)));
        assert!(result.position_size > 0);
    }

    #[test]
    fn split_decision_holds_with_capped_confidence() {
        let verdicts = vec![
            verdict("contrarian", 0.6, 0.6),
            verdict("growth", 0.6, 0.6),
            verdict("multimodal", -0.6, 0.6),
            verdict("predictor", -0.6, 0.6),
        ];

        let result = engine().decide(
            &ticker(),
            Utc::now(),
            Some(dec!(100.00)),
            verdicts,
            &unit_weights(),
        );

        assert_eq!(result.signal_type, SignalType::Hold);
        assert!(result.confidence <= 0.5, "confidence {}", result.confidence);
        assert_eq!(result.position_size, 0);
        assert!(result.stop_loss.is_none());
        assert!(result.target_price.is_none());
    }

    #[test]
    fn all_agents_failed_is_neutral_hold() {
        let verdicts = vec![
            AgentVerdict::failed("contrarian", "timeout"),
            AgentVerdict::failed("growth", "timeout"),
            AgentVerdict::failed("multimodal", "timeout"),
            AgentVerdict::failed("predictor", "timeout"),
        ];

        let result = engine().decide(
            &ticker(),
            Utc::now(),
            Some(dec!(100.00)),
            verdicts,
            &unit_weights(),
        );

        assert_eq!(result.signal_type, SignalType::Hold);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.position_size, 0);
        assert!(result.stop_loss.is_none());
        // Failures are preserved for audit.
        assert_eq!(result.agent_verdicts.len(), 4);
        assert!(result.agent_verdicts.iter().all(|v| v.failed));
    }

    #[test]
    fn failed_agents_are_excluded_from_the_blend() {
        let verdicts = vec![
            verdict("predictor", 0.8, 0.9),
            AgentVerdict::failed("contrarian", "parse error"),
        ];

        let result = engine().decide(
            &ticker(),
            Utc::now(),
            Some(dec!(50.00)),
            verdicts,
            &unit_weights(),
        );

        assert_eq!(result.signal_type, SignalType::Buy);
        assert!(result.confidence > 0.5);
    }

    #[test]
    fn agent_weights_shift_the_blend() {
        let verdicts = vec![
            verdict("loud", 0.8, 0.8),
            verdict("quiet", -0.8, 0.8),
        ];
        let mut weights = BTreeMap::new();
        weights.insert("loud".to_string(), 3.0);
        weights.insert("quiet".to_string(), 1.0);

        let result = engine().decide(
            &ticker(),
            Utc::now(),
            Some(dec!(100.00)),
            verdicts,
            &weights,
        );

        // 3x weight on the bull overwhelms the bear: (3*.8*.8 - 1*.8*.8) /
        // (3*.8 + 1*.8) = 0.4
        assert_eq!(result.signal_type, SignalType::Buy);
    }

    #[test]
    fn missing_quote_downgrades_to_hold() {
        let verdicts = vec![verdict("predictor", 0.9, 0.9)];

        let result = engine().decide(&ticker(), Utc::now(), None, verdicts, &unit_weights());

        assert_eq!(result.signal_type, SignalType::Hold);
        assert_eq!(result.position_size, 0);
        assert!(result.stop_loss.is_none());
        assert!(result.target_price.is_none());
        assert!(result
            .notes
            .as_deref()
            .unwrap()
            .contains("downgraded to HOLD"));
    }

    #[test]
    fn sub_share_position_downgrades_to_hold() {
        let tight = ConsensusEngine::new(
            ConsensusConfig::default(),
            RiskConfig {
                capital: dec!(100),
                ..RiskConfig::default()
            },
        );
        // 100 x 0.10 x confidence buys no whole share at 900.
        let result = tight.decide(
            &ticker(),
            Utc::now(),
            Some(dec!(900.00)),
            vec![verdict("predictor", 0.9, 0.9)],
            &unit_weights(),
        );

        assert_eq!(result.signal_type, SignalType::Hold);
        assert_eq!(result.position_size, 0);
        assert!(result.stop_loss.is_none());
        assert!(result
            .notes
            .as_deref()
            .unwrap()
            .contains("rounds to zero"));
    }

    #[test]
    fn zero_entry_price_yields_zero_position() {
        let verdicts = vec![verdict("predictor", 0.9, 0.9)];

        let result = engine().decide(
            &ticker(),
            Utc::now(),
            Some(Decimal::ZERO),
            verdicts,
            &unit_weights(),
        );

        assert_eq!(result.position_size, 0);
        assert_eq!(result.signal_type, SignalType::Hold);
    }

    #[test]
    fn decision_is_deterministic() {
        let make = || {
            vec![
                verdict("contrarian", 0.8, 0.8),
                verdict("predictor", 0.6, 0.6),
                verdict("growth", 0.0, 0.2),
                verdict("multimodal", 0.7, 0.7),
            ]
        };
        let at = Utc::now();
        let a = engine().decide(&ticker(), at, Some(dec!(150.00)), make(), &unit_weights());
        let b = engine().decide(&ticker(), at, Some(dec!(150.00)), make(), &unit_weights());
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }

    #[test]
    fn buy_invariant_prices_are_ordered() {
        let verdicts = vec![verdict("predictor", 0.9, 0.9)];
        let result = engine().decide(
            &ticker(),
            Utc::now(),
            Some(dec!(87.35)),
            verdicts,
            &unit_weights(),
        );

        assert_eq!(result.signal_type, SignalType::Buy);
        let entry = result.entry_price.unwrap();
        assert!(result.stop_loss.unwrap() < entry);
        assert!(result.target_price.unwrap() > entry);
    }
}
