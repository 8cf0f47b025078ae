//! Indicators derived locally from the historical series.
//!
//! Used to fill gaps when no provider returns an indicator, and to compute
//! the price-change and volume-trend fields that never come from providers.

use rust_decimal::prelude::ToPrimitive;
use stocksense_core::{DailyBar, VolumeTrend};

/// 14-period RSI from daily bars (newest first). Returns `None` with fewer
/// than `period + 1` bars.
#[must_use]
pub fn rsi(bars: &[DailyBar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }

    // Oldest-first closes over the window we need.
    let closes: Vec<f64> = bars[..=period]
        .iter()
        .rev()
        .map(|b| b.close.to_f64().unwrap_or(0.0))
        .collect();

    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    for pair in closes.windows(2) {
        let delta = pair[1] - pair[0];
        if delta > 0.0 {
            gain_sum += delta;
        } else {
            loss_sum -= delta;
        }
    }

    let avg_gain = gain_sum / period as f64;
    let avg_loss = loss_sum / period as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Percent change between the newest close and the close `days` bars back.
/// Returns `None` when the series is too short or the base price is zero.
#[must_use]
pub fn price_change_pct(bars: &[DailyBar], days: usize) -> Option<f64> {
    if days == 0 || bars.len() <= days.saturating_sub(1) {
        return None;
    }
    let current = bars.first()?.close.to_f64()?;
    let past = bars.get(days - 1)?.close.to_f64()?;
    if past == 0.0 {
        return None;
    }
    Some((current - past) / past * 100.0)
}

/// Volume trend: recent 5-day average against the prior 5-day average,
/// with a ±20% neutral band. Fewer than 10 bars is `Unknown`.
#[must_use]
pub fn volume_trend(bars: &[DailyBar]) -> VolumeTrend {
    if bars.len() < 10 {
        return VolumeTrend::Unknown;
    }

    let recent: f64 = bars[..5].iter().map(|b| b.volume as f64).sum::<f64>() / 5.0;
    let older: f64 = bars[5..10].iter().map(|b| b.volume as f64).sum::<f64>() / 5.0;

    if older == 0.0 {
        return VolumeTrend::Neutral;
    }

    let change = (recent - older) / older;
    if change > 0.2 {
        VolumeTrend::Increasing
    } else if change < -0.2 {
        VolumeTrend::Decreasing
    } else {
        VolumeTrend::Neutral
    }
}
