//! Backtest data model: requests, trades, metrics, reports.

use crate::ticker::Ticker;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// How backtest capital is split among ranked signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationMode {
    CoreFocus,
    Balanced,
    Diversified,
}

impl AllocationMode {
    /// All modes, for compare-modes runs.
    pub const ALL: [Self; 3] = [Self::CoreFocus, Self::Balanced, Self::Diversified];
}

impl fmt::Display for AllocationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::CoreFocus => "CORE_FOCUS",
            Self::Balanced => "BALANCED",
            Self::Diversified => "DIVERSIFIED",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for AllocationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CORE_FOCUS" => Ok(Self::CoreFocus),
            "BALANCED" => Ok(Self::Balanced),
            "DIVERSIFIED" => Ok(Self::Diversified),
            other => Err(format!("unknown allocation mode: {other}")),
        }
    }
}

/// Why a simulated trade exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    HoldPeriodEnd,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::StopLoss => "STOP_LOSS",
            Self::TakeProfit => "TAKE_PROFIT",
            Self::HoldPeriodEnd => "HOLD_PERIOD_END",
        };
        f.write_str(label)
    }
}

/// Slot the allocation placed this trade in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionType {
    Core,
    Satellite,
    Equal,
}

impl fmt::Display for PositionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Core => "CORE",
            Self::Satellite => "SATELLITE",
            Self::Equal => "EQUAL",
        };
        f.write_str(label)
    }
}

/// Win/loss outcome of one trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeResult {
    Win,
    Loss,
}

/// One simulated trade produced during a backtest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestTrade {
    /// The persisted verdict this trade replays.
    pub signal_id: i64,
    pub ticker: Ticker,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub shares: i64,
    /// (exit - entry) x shares.
    pub pnl: Decimal,
    /// pnl / (entry x shares), a fraction.
    pub pnl_pct: Decimal,
    pub result: TradeResult,
    pub days_held: i64,
    pub exit_reason: ExitReason,
    pub position_type: PositionType,
    /// Fraction of starting capital allocated to this trade.
    pub allocation_pct: Decimal,
}

/// Portfolio-level metrics for one backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub total_pnl: Decimal,
    /// total_pnl / starting_capital, a fraction.
    pub total_return_pct: Decimal,
    pub win_rate: f64,
    /// Annualized: mean(daily returns) / stddev x sqrt(252); 0 when stddev
    /// is zero.
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough equity decline, a fraction.
    pub max_drawdown: f64,
    pub profit_factor: f64,
    pub avg_gain: Decimal,
    pub avg_loss: Decimal,
    pub largest_win: Decimal,
    pub largest_loss: Decimal,
    pub avg_hold_days: f64,
}

/// Per-agent contribution summary across a run's trades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAttribution {
    pub agent_name: String,
    pub trades: usize,
    pub win_rate: f64,
    pub avg_pnl: Decimal,
}

/// One point on the equity curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub value: Decimal,
}

/// The full result of one backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub run_id: Uuid,
    pub mode: AllocationMode,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub starting_capital: Decimal,
    pub ending_capital: Decimal,
    pub hold_period_days: u32,
    pub created_at: DateTime<Utc>,
    /// Allocation-rank order, independent of simulation completion order.
    pub trades: Vec<BacktestTrade>,
    pub wins: usize,
    pub losses: usize,
    pub metrics: BacktestMetrics,
    pub attribution: Vec<AgentAttribution>,
    pub equity_curve: Vec<EquityPoint>,
    /// Dropped trades and other per-run notes.
    pub warnings: Vec<String>,
}

/// Parameters for one backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub mode: AllocationMode,
    pub starting_capital: Decimal,
    pub hold_period_days: u32,
    /// Restrict the selection to these tickers when present.
    pub tickers: Option<Vec<Ticker>>,
}
