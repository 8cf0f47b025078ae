//! Portfolio allocation across ranked signals.
//!
//! Three fixed policies:
//! - CORE_FOCUS:  60% core, 3 x 10% satellites, 10% cash
//! - BALANCED:    40% core, 4 x 12.5% satellites, 10% cash
//! - DIVERSIFIED: 80% split equally across the top 5, 20% cash

use crate::ranker::RankedSignal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use stocksense_core::{AllocationMode, PositionType, Verdict};
use tracing::debug;

/// One funded slot.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub verdict: Verdict,
    pub rank: usize,
    pub score: f64,
    pub allocation_pct: Decimal,
    pub position_value: Decimal,
    pub shares: i64,
    pub position_type: PositionType,
}

/// Cash kept out of the market for a mode.
#[must_use]
pub fn cash_reserve_pct(mode: AllocationMode) -> Decimal {
    match mode {
        AllocationMode::CoreFocus | AllocationMode::Balanced => Decimal::new(10, 2),
        AllocationMode::Diversified => Decimal::new(20, 2),
    }
}

/// Assigns capital to the top-ranked signals according to the mode. Output
/// keeps rank order. Slots whose share count floors to zero are still
/// reported; the simulator skips them.
#[must_use]
pub fn allocate(
    ranked: &[RankedSignal],
    capital: Decimal,
    mode: AllocationMode,
) -> Vec<Allocation> {
    let slots: Vec<(Decimal, PositionType)> = match mode {
        AllocationMode::CoreFocus => {
            let mut slots = vec![(Decimal::new(60, 2), PositionType::Core)];
            slots.extend(std::iter::repeat((Decimal::new(10, 2), PositionType::Satellite)).take(3));
            slots
        }
        AllocationMode::Balanced => {
            let mut slots = vec![(Decimal::new(40, 2), PositionType::Core)];
            slots.extend(
                std::iter::repeat((Decimal::new(125, 3), PositionType::Satellite)).take(4),
            );
            slots
        }
        AllocationMode::Diversified => {
            // 80% equally over however many of the top five exist.
            let count = ranked.len().min(5);
            if count == 0 {
                Vec::new()
            } else {
                let per = Decimal::new(80, 2) / Decimal::from(count as i64);
                std::iter::repeat((per, PositionType::Equal)).take(count).collect()
            }
        }
    };

    let allocations: Vec<Allocation> = ranked
        .iter()
        .zip(slots)
        .map(|(signal, (pct, position_type))| {
            let position_value = (capital * pct).round_dp(2);
            let shares = signal
                .verdict
                .entry_price
                .filter(|entry| *entry > Decimal::ZERO)
                .and_then(|entry| (position_value / entry).floor().to_i64())
                .unwrap_or(0)
                .max(0);
            Allocation {
                verdict: signal.verdict.clone(),
                rank: signal.rank,
                score: signal.score,
                allocation_pct: pct,
                position_value,
                shares,
                position_type,
            }
        })
        .collect();

    debug!(%mode, positions = allocations.len(), %capital, "allocated portfolio");
    allocations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranker::rank_signals;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use stocksense_core::{SignalStatus, SignalType, Ticker};

    fn buy(id: i64, confidence: f64, entry: Decimal) -> Verdict {
        Verdict {
            id: Some(id),
            ticker: Ticker::parse("NVDA").unwrap(),
            created_at: Utc::now(),
            signal_type: SignalType::Buy,
            confidence,
            entry_price: Some(entry),
            stop_loss: Some(entry * dec!(0.95)),
            target_price: Some(entry * dec!(1.25)),
            position_size: 1,
            status: SignalStatus::Pending,
            pnl: None,
            notes: None,
            agent_verdicts: vec![],
        }
    }

    fn ranked(n: usize) -> Vec<RankedSignal> {
        // Descending confidence gives descending composite scores.
        let verdicts = (0..n)
            .map(|i| buy(i as i64 + 1, 0.9 - 0.1 * i as f64, dec!(100.00)))
            .collect();
        rank_signals(verdicts)
    }

    #[test]
    fn core_focus_distribution() {
        let allocations = allocate(&ranked(4), dec!(100000), AllocationMode::CoreFocus);
        let values: Vec<Decimal> = allocations.iter().map(|a| a.position_value).collect();
        assert_eq!(
            values,
            vec![dec!(60000.00), dec!(10000.00), dec!(10000.00), dec!(10000.00)]
        );
        assert_eq!(allocations[0].position_type, PositionType::Core);
        assert!(allocations[1..]
            .iter()
            .all(|a| a.position_type == PositionType::Satellite));
        assert_eq!(allocations[0].shares, 600);
    }

    #[test]
    fn balanced_distribution() {
        let allocations = allocate(&ranked(5), dec!(100000), AllocationMode::Balanced);
        let values: Vec<Decimal> = allocations.iter().map(|a| a.position_value).collect();
        assert_eq!(
            values,
            vec![
                dec!(40000.00),
                dec!(12500.00),
                dec!(12500.00),
                dec!(12500.00),
                dec!(12500.00)
            ]
        );
    }

    #[test]
    fn diversified_distribution() {
        let allocations = allocate(&ranked(5), dec!(100000), AllocationMode::Diversified);
        assert_eq!(allocations.len(), 5);
        for allocation in &allocations {
            assert_eq!(allocation.allocation_pct, dec!(0.16));
            assert_eq!(allocation.position_value, dec!(16000.00));
            assert_eq!(allocation.position_type, PositionType::Equal);
        }
    }

    #[test]
    fn diversified_splits_eighty_percent_over_fewer_signals() {
        let allocations = allocate(&ranked(2), dec!(100000), AllocationMode::Diversified);
        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].allocation_pct, dec!(0.40));
    }

    #[test]
    fn allocation_law_holds_for_every_mode() {
        for mode in AllocationMode::ALL {
            let allocations = allocate(&ranked(8), dec!(50000), mode);
            let invested: Decimal = allocations.iter().map(|a| a.allocation_pct).sum();
            let total = invested + cash_reserve_pct(mode);
            assert!(
                (total - Decimal::ONE).abs() < dec!(0.000001),
                "{mode}: invested {invested} + cash != 1"
            );
        }
    }

    #[test]
    fn fewer_signals_than_slots_just_truncates() {
        let allocations = allocate(&ranked(2), dec!(100000), AllocationMode::CoreFocus);
        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].position_value, dec!(60000.00));
        assert_eq!(allocations[1].position_value, dec!(10000.00));
    }

    #[test]
    fn zero_signals_allocates_nothing() {
        for mode in AllocationMode::ALL {
            assert!(allocate(&[], dec!(100000), mode).is_empty());
        }
    }

    #[test]
    fn allocations_keep_rank_order() {
        let allocations = allocate(&ranked(4), dec!(100000), AllocationMode::CoreFocus);
        let ranks: Vec<usize> = allocations.iter().map(|a| a.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }
}
