//! Price history for replay, served by the data aggregator.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use stocksense_aggregator::DataAggregator;
use stocksense_backtest::PriceHistory;
use stocksense_core::{DailyBar, Ticker};

/// Providers return the most recent N daily bars, so the lookback has to
/// stretch from today back past the window start, plus slack for market
/// holidays. Capped at the 100 bars the snapshot model allows.
pub(crate) fn lookback_days(window_start: NaiveDate, hold_period_days: u32) -> u32 {
    let today = Utc::now().date_naive();
    let to_start = (today - window_start).num_days().max(0) as u32;
    (to_start + hold_period_days + 5).min(100)
}

pub(crate) struct AggregatorPrices {
    aggregator: Arc<DataAggregator>,
}

impl AggregatorPrices {
    pub(crate) fn new(aggregator: Arc<DataAggregator>) -> Self {
        Self { aggregator }
    }
}

#[async_trait]
impl PriceHistory for AggregatorPrices {
    async fn bars_for_window(
        &self,
        ticker: &Ticker,
        start: NaiveDate,
        days: u32,
    ) -> Option<Vec<DailyBar>> {
        let bars = self
            .aggregator
            .historical(ticker, lookback_days(start, days))
            .await?;
        // The simulator only cares about bars inside the window; filtering
        // here keeps dropped-trade detection accurate.
        let end = start.checked_add_days(chrono::Days::new(u64::from(days)))?;
        let window: Vec<DailyBar> = bars
            .into_iter()
            .filter(|bar| bar.date >= start && bar.date <= end)
            .collect();
        (!window.is_empty()).then_some(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    #[test]
    fn lookback_reaches_past_the_window_start() {
        let start = Utc::now().date_naive() - Days::new(20);
        let days = lookback_days(start, 30);
        assert!(days >= 50);
        assert!(days <= 100);
    }

    #[test]
    fn lookback_caps_at_the_snapshot_limit() {
        let start = Utc::now().date_naive() - Days::new(400);
        assert_eq!(lookback_days(start, 30), 100);
    }
}
