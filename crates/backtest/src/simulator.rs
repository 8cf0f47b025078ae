//! Day-by-day hold simulation with stop/target exit rules.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use stocksense_core::{DailyBar, ExitReason};

/// Outcome of walking one trade through its hold window.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedExit {
    pub exit_date: NaiveDate,
    pub exit_price: Decimal,
    pub exit_reason: ExitReason,
    pub days_held: i64,
}

/// Walks forward from the day after entry for up to `hold_period_days`.
/// The first triggered condition exits the trade:
/// - the day's low at or below the stop exits at the stop (checked first:
///   when a single bar spans both levels the conservative fill wins),
/// - the day's high at or above the target exits at the target,
/// - an exhausted hold window exits at the close of the last bar at or
///   before the final day.
///
/// Returns `None` when no bar falls inside the window at all (nothing to
/// price an exit with); the caller drops the trade.
#[must_use]
pub fn simulate_hold(
    bars: &BTreeMap<NaiveDate, DailyBar>,
    entry_date: NaiveDate,
    stop_loss: Decimal,
    target_price: Decimal,
    hold_period_days: u32,
) -> Option<SimulatedExit> {
    let final_day = entry_date.checked_add_days(Days::new(u64::from(hold_period_days)))?;

    for offset in 1..=u64::from(hold_period_days) {
        let date = entry_date.checked_add_days(Days::new(offset))?;
        let Some(bar) = bars.get(&date) else {
            // Weekend or holiday; the position simply carries.
            continue;
        };

        if bar.low <= stop_loss {
            return Some(SimulatedExit {
                exit_date: date,
                exit_price: stop_loss,
                exit_reason: ExitReason::StopLoss,
                days_held: offset as i64,
            });
        }
        if bar.high >= target_price {
            return Some(SimulatedExit {
                exit_date: date,
                exit_price: target_price,
                exit_reason: ExitReason::TakeProfit,
                days_held: offset as i64,
            });
        }
    }

    // Hold period elapsed: exit at the close of the last bar in the window.
    let (date, bar) = bars
        .range(entry_date.checked_add_days(Days::new(1))?..=final_day)
        .next_back()?;
    Some(SimulatedExit {
        exit_date: *date,
        exit_price: bar.close,
        exit_reason: ExitReason::HoldPeriodEnd,
        days_held: (*date - entry_date).num_days(),
    })
}
