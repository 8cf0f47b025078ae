//! The backtest engine: selection in, report out.

use crate::allocator::{allocate, cash_reserve_pct};
use crate::metrics::compute_metrics;
use crate::ranker::rank_signals;
use crate::simulator::simulate_hold;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use stocksense_core::{
    AgentAttribution, AllocationMode, BacktestReport, BacktestRequest, BacktestTrade, DailyBar,
    EngineError, SignalType, Ticker, TradeResult, Verdict,
};
use tracing::{info, warn};
use uuid::Uuid;

/// Source of daily bars for replay. Implemented over the data aggregator in
/// production and over fixtures in tests.
#[async_trait]
pub trait PriceHistory: Send + Sync {
    /// Bars covering `[start, start + days]` for a ticker, any order.
    /// `None` (or an empty window) drops the trade.
    async fn bars_for_window(
        &self,
        ticker: &Ticker,
        start: NaiveDate,
        days: u32,
    ) -> Option<Vec<DailyBar>>;
}

pub struct BacktestEngine;

impl BacktestEngine {
    /// Replays the selected verdicts under the requested allocation mode.
    ///
    /// # Errors
    /// `BadInput` for an inverted date range, non-positive capital, or a
    /// zero hold period; `InvalidState` when the selection contains no BUY
    /// verdicts.
    pub async fn run(
        request: &BacktestRequest,
        selection: Vec<Verdict>,
        prices: &dyn PriceHistory,
    ) -> Result<BacktestReport, EngineError> {
        if request.start_date > request.end_date {
            return Err(EngineError::BadInput(format!(
                "start {} is after end {}",
                request.start_date, request.end_date
            )));
        }
        if request.starting_capital <= Decimal::ZERO {
            return Err(EngineError::BadInput(
                "starting capital must be positive".into(),
            ));
        }
        if request.hold_period_days == 0 {
            return Err(EngineError::BadInput(
                "hold period must be at least one day".into(),
            ));
        }

        let buys: Vec<Verdict> = selection
            .into_iter()
            .filter(|v| v.signal_type == SignalType::Buy)
            .collect();
        if buys.is_empty() {
            return Err(EngineError::InvalidState(
                "backtest selection contains no BUY signals".into(),
            ));
        }

        let ranked = rank_signals(buys);
        let allocations = allocate(&ranked, request.starting_capital, request.mode);

        let mut warnings = Vec::new();
        let mut trades = Vec::new();
        let mut traded_verdicts: Vec<&Verdict> = Vec::new();
        let mut bar_cache: HashMap<String, Option<BTreeMap<NaiveDate, DailyBar>>> = HashMap::new();

        for allocation in &allocations {
            if allocation.shares == 0 {
                warnings.push(format!(
                    "{}: allocation too small for one share, skipped",
                    allocation.verdict.ticker
                ));
                continue;
            }
            let verdict = &allocation.verdict;
            let (Some(entry_price), Some(stop), Some(target)) =
                (verdict.entry_price, verdict.stop_loss, verdict.target_price)
            else {
                warnings.push(format!("{}: missing risk prices, skipped", verdict.ticker));
                continue;
            };
            let entry_date = verdict.created_at.date_naive();

            let cache_key = format!("{}@{entry_date}", verdict.ticker);
            if !bar_cache.contains_key(&cache_key) {
                let fetched = match prices
                    .bars_for_window(&verdict.ticker, entry_date, request.hold_period_days)
                    .await
                {
                    Some(bars) if !bars.is_empty() => {
                        Some(bars.into_iter().map(|b| (b.date, b)).collect())
                    }
                    _ => None,
                };
                bar_cache.insert(cache_key.clone(), fetched);
            }
            let Some(bars) = bar_cache.get(&cache_key).and_then(Option::as_ref) else {
                warn!(ticker = %verdict.ticker, "no historical prices, dropping trade");
                warnings.push(format!(
                    "{}: no historical prices for the hold window, trade dropped",
                    verdict.ticker
                ));
                continue;
            };

            let Some(exit) =
                simulate_hold(bars, entry_date, stop, target, request.hold_period_days)
            else {
                warnings.push(format!(
                    "{}: no bars inside the hold window, trade dropped",
                    verdict.ticker
                ));
                continue;
            };

            let shares = Decimal::from(allocation.shares);
            let pnl = ((exit.exit_price - entry_price) * shares).round_dp(2);
            let pnl_pct = if entry_price > Decimal::ZERO {
                (pnl / (entry_price * shares)).round_dp(6)
            } else {
                Decimal::ZERO
            };

            trades.push(BacktestTrade {
                signal_id: verdict.id.unwrap_or_default(),
                ticker: verdict.ticker.clone(),
                entry_date,
                exit_date: exit.exit_date,
                entry_price,
                exit_price: exit.exit_price,
                shares: allocation.shares,
                pnl,
                pnl_pct,
                result: if pnl > Decimal::ZERO {
                    TradeResult::Win
                } else {
                    TradeResult::Loss
                },
                days_held: exit.days_held,
                exit_reason: exit.exit_reason,
                position_type: allocation.position_type,
                allocation_pct: allocation.allocation_pct,
            });
            traded_verdicts.push(verdict);
        }

        let (metrics, equity_curve) = compute_metrics(&trades, request.starting_capital);
        let attribution = Self::attribute(&trades, &traded_verdicts);
        let wins = trades
            .iter()
            .filter(|t| t.result == TradeResult::Win)
            .count();
        let losses = trades.len() - wins;
        let ending_capital = request.starting_capital + metrics.total_pnl;

        info!(
            mode = %request.mode,
            trades = trades.len(),
            total_pnl = %metrics.total_pnl,
            cash_reserve = %(request.starting_capital * cash_reserve_pct(request.mode)),
            "backtest complete"
        );

        Ok(BacktestReport {
            run_id: Uuid::new_v4(),
            mode: request.mode,
            start_date: request.start_date,
            end_date: request.end_date,
            starting_capital: request.starting_capital,
            ending_capital,
            hold_period_days: request.hold_period_days,
            created_at: Utc::now(),
            trades,
            wins,
            losses,
            metrics,
            attribution,
            equity_curve,
            warnings,
        })
    }

    /// Runs steps ranking through aggregation independently for each of the
    /// three modes over the same selection.
    ///
    /// # Errors
    /// Same conditions as [`BacktestEngine::run`].
    pub async fn compare_modes(
        request: &BacktestRequest,
        selection: Vec<Verdict>,
        prices: &dyn PriceHistory,
    ) -> Result<Vec<BacktestReport>, EngineError> {
        let mut reports = Vec::with_capacity(AllocationMode::ALL.len());
        for mode in AllocationMode::ALL {
            let mut per_mode = request.clone();
            per_mode.mode = mode;
            reports.push(Self::run(&per_mode, selection.clone(), prices).await?);
        }
        Ok(reports)
    }

    /// Per-agent win rate and average P&L across the trades whose source
    /// verdict carried a non-failed verdict from that agent.
    fn attribute(trades: &[BacktestTrade], verdicts: &[&Verdict]) -> Vec<AgentAttribution> {
        let mut by_agent: BTreeMap<&str, Vec<&BacktestTrade>> = BTreeMap::new();
        for (trade, verdict) in trades.iter().zip(verdicts) {
            for agent in verdict.contributing_agents() {
                by_agent.entry(agent).or_default().push(trade);
            }
        }

        by_agent
            .into_iter()
            .map(|(agent_name, agent_trades)| {
                let wins = agent_trades
                    .iter()
                    .filter(|t| t.result == TradeResult::Win)
                    .count();
                let total: Decimal = agent_trades.iter().map(|t| t.pnl).sum();
                AgentAttribution {
                    agent_name: agent_name.to_string(),
                    trades: agent_trades.len(),
                    win_rate: wins as f64 / agent_trades.len() as f64,
                    avg_pnl: (total / Decimal::from(agent_trades.len() as i64)).round_dp(2),
                }
            })
            .collect()
    }
}
