//! Portfolio-level metrics over a set of simulated trades.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use stocksense_core::{BacktestMetrics, BacktestTrade, EquityPoint, TradeResult};

/// Trading days per year for Sharpe annualization.
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Computes metrics and the equity curve. The curve is ordered by exit date
/// (ties by signal id) starting from the initial capital, so identical
/// inputs produce an identical curve.
#[must_use]
pub fn compute_metrics(
    trades: &[BacktestTrade],
    starting_capital: Decimal,
) -> (BacktestMetrics, Vec<EquityPoint>) {
    if trades.is_empty() {
        return (
            BacktestMetrics {
                total_pnl: Decimal::ZERO,
                total_return_pct: Decimal::ZERO,
                win_rate: 0.0,
                sharpe_ratio: 0.0,
                max_drawdown: 0.0,
                profit_factor: 0.0,
                avg_gain: Decimal::ZERO,
                avg_loss: Decimal::ZERO,
                largest_win: Decimal::ZERO,
                largest_loss: Decimal::ZERO,
                avg_hold_days: 0.0,
            },
            Vec::new(),
        );
    }

    let wins: Vec<&BacktestTrade> = trades.iter().filter(|t| t.result == TradeResult::Win).collect();
    let losses: Vec<&BacktestTrade> =
        trades.iter().filter(|t| t.result == TradeResult::Loss).collect();

    let total_pnl: Decimal = trades.iter().map(|t| t.pnl).sum();
    let total_return_pct = if starting_capital > Decimal::ZERO {
        (total_pnl / starting_capital).round_dp(6)
    } else {
        Decimal::ZERO
    };
    let win_rate = wins.len() as f64 / trades.len() as f64;

    let gross_profit: Decimal = wins.iter().map(|t| t.pnl).sum();
    let gross_loss: Decimal = -losses.iter().map(|t| t.pnl).sum::<Decimal>();
    let profit_factor = if gross_loss > Decimal::ZERO {
        (gross_profit / gross_loss).to_f64().unwrap_or(0.0)
    } else if gross_profit > Decimal::ZERO {
        f64::INFINITY
    } else {
        0.0
    };

    let avg_gain = if wins.is_empty() {
        Decimal::ZERO
    } else {
        (gross_profit / Decimal::from(wins.len() as i64)).round_dp(2)
    };
    let avg_loss = if losses.is_empty() {
        Decimal::ZERO
    } else {
        (-gross_loss / Decimal::from(losses.len() as i64)).round_dp(2)
    };
    let largest_win = wins.iter().map(|t| t.pnl).max().unwrap_or(Decimal::ZERO);
    let largest_loss = losses.iter().map(|t| t.pnl).min().unwrap_or(Decimal::ZERO);

    // Return series over the trades, in equity-curve order.
    let mut ordered: Vec<&BacktestTrade> = trades.iter().collect();
    ordered.sort_by_key(|t| (t.exit_date, t.signal_id));

    let returns: Vec<f64> = ordered
        .iter()
        .filter_map(|t| t.pnl_pct.to_f64())
        .collect();
    let sharpe_ratio = sharpe(&returns);

    let mut equity_curve = Vec::with_capacity(ordered.len());
    let mut equity = starting_capital;
    let mut peak = starting_capital;
    let mut max_drawdown = 0.0f64;
    for trade in &ordered {
        equity += trade.pnl;
        if equity > peak {
            peak = equity;
        }
        if peak > Decimal::ZERO {
            let drawdown = ((peak - equity) / peak).to_f64().unwrap_or(0.0);
            max_drawdown = max_drawdown.max(drawdown);
        }
        equity_curve.push(EquityPoint {
            date: trade.exit_date,
            value: equity.round_dp(2),
        });
    }

    let avg_hold_days =
        trades.iter().map(|t| t.days_held as f64).sum::<f64>() / trades.len() as f64;

    (
        BacktestMetrics {
            total_pnl: total_pnl.round_dp(2),
            total_return_pct,
            win_rate,
            sharpe_ratio,
            max_drawdown,
            profit_factor,
            avg_gain,
            avg_loss,
            largest_win,
            largest_loss,
            avg_hold_days,
        },
        equity_curve,
    )
}

/// Annualized Sharpe over the per-trade return series; zero when the
/// deviation vanishes.
fn sharpe(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    if std_dev > 0.0 {
        mean / std_dev * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}
