//! Signal ranking by composite quality score.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use stocksense_core::{SignalType, Verdict};
use tracing::debug;

/// A verdict with its ranking context.
#[derive(Debug, Clone)]
pub struct RankedSignal {
    pub verdict: Verdict,
    /// confidence x expected_return x (1 / risk_factor).
    pub score: f64,
    /// 1-based position after sorting.
    pub rank: usize,
    pub expected_return: f64,
    pub risk_factor: f64,
}

/// Scores and sorts BUY verdicts, best first. Verdicts without usable risk
/// prices (a corrupt stop at or above entry, missing prices) are skipped.
/// Ties keep their input order, so ranking is deterministic.
#[must_use]
pub fn rank_signals(verdicts: Vec<Verdict>) -> Vec<RankedSignal> {
    let total = verdicts.len();
    let mut ranked: Vec<RankedSignal> = verdicts
        .into_iter()
        .filter(|v| v.signal_type == SignalType::Buy)
        .filter_map(|verdict| {
            let expected_return = decimal_to_f64(verdict.expected_return()?)?;
            let risk_factor = decimal_to_f64(verdict.risk_factor()?)?;
            if risk_factor <= 0.0 {
                debug!(id = ?verdict.id, "skipping verdict with non-positive risk factor");
                return None;
            }
            let score = verdict.confidence * expected_return * (1.0 / risk_factor);
            Some(RankedSignal {
                verdict,
                score,
                rank: 0,
                expected_return,
                risk_factor,
            })
        })
        .collect();

    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    for (index, item) in ranked.iter_mut().enumerate() {
        item.rank = index + 1;
    }

    debug!(ranked = ranked.len(), total, "ranked buy signals");
    ranked
}

fn decimal_to_f64(value: Decimal) -> Option<f64> {
    value.to_f64()
}
