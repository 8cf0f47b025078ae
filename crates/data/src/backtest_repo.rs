//! Backtest run persistence: one run row plus one row per simulated trade.

use crate::models::BacktestTradeRow;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use stocksense_core::{AllocationMode, BacktestReport, EngineError};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct BacktestRepository {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct RunRow {
    run_id: Uuid,
    mode: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    starting_capital: Decimal,
    ending_capital: Decimal,
    hold_period_days: i32,
    wins: i32,
    losses: i32,
    metrics: serde_json::Value,
    attribution: serde_json::Value,
    equity_curve: serde_json::Value,
    warnings: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl BacktestRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Saves a report and all of its trades in one transaction; returns the
    /// run id.
    ///
    /// # Errors
    /// `Fatal` on database failure.
    pub async fn save_backtest(&self, report: &BacktestReport) -> Result<Uuid, EngineError> {
        let mut tx = self.pool.begin().await.map_err(fatal)?;

        sqlx::query(
            r"
            INSERT INTO backtest_runs
                (run_id, mode, start_date, end_date, starting_capital, ending_capital,
                 hold_period_days, wins, losses, metrics, attribution, equity_curve,
                 warnings, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ",
        )
        .bind(report.run_id)
        .bind(report.mode.to_string())
        .bind(report.start_date)
        .bind(report.end_date)
        .bind(report.starting_capital)
        .bind(report.ending_capital)
        .bind(report.hold_period_days as i32)
        .bind(report.wins as i32)
        .bind(report.losses as i32)
        .bind(to_json(&report.metrics)?)
        .bind(to_json(&report.attribution)?)
        .bind(to_json(&report.equity_curve)?)
        .bind(to_json(&report.warnings)?)
        .bind(report.created_at)
        .execute(&mut *tx)
        .await
        .map_err(fatal)?;

        for trade in &report.trades {
            sqlx::query(
                r"
                INSERT INTO backtest_results
                    (run_id, signal_id, ticker, entry_date, exit_date, entry_price,
                     exit_price, shares, pnl, pnl_pct, trade_result, days_held,
                     exit_reason, position_type, allocation_pct)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                ",
            )
            .bind(report.run_id)
            .bind(trade.signal_id)
            .bind(trade.ticker.as_str())
            .bind(trade.entry_date)
            .bind(trade.exit_date)
            .bind(trade.entry_price)
            .bind(trade.exit_price)
            .bind(trade.shares)
            .bind(trade.pnl)
            .bind(trade.pnl_pct)
            .bind(serde_enum_name(&trade.result)?)
            .bind(trade.days_held as i32)
            .bind(serde_enum_name(&trade.exit_reason)?)
            .bind(serde_enum_name(&trade.position_type)?)
            .bind(trade.allocation_pct)
            .execute(&mut *tx)
            .await
            .map_err(fatal)?;
        }

        tx.commit().await.map_err(fatal)?;
        info!(run_id = %report.run_id, trades = report.trades.len(), "saved backtest");
        Ok(report.run_id)
    }

    /// Loads a report with its trades in rank order.
    ///
    /// # Errors
    /// `BadInput` for an unknown run id, `Fatal` on database failure.
    pub async fn load_backtest(&self, run_id: Uuid) -> Result<BacktestReport, EngineError> {
        let run: Option<RunRow> = sqlx::query_as(
            r"
            SELECT run_id, mode, start_date, end_date, starting_capital, ending_capital,
                   hold_period_days, wins, losses, metrics, attribution, equity_curve,
                   warnings, created_at
            FROM backtest_runs WHERE run_id = $1
            ",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(fatal)?;
        let run =
            run.ok_or_else(|| EngineError::BadInput(format!("backtest {run_id} not found")))?;

        let trade_rows: Vec<BacktestTradeRow> = sqlx::query_as(
            r"
            SELECT signal_id, ticker, entry_date, exit_date, entry_price, exit_price,
                   shares, pnl, pnl_pct, trade_result, days_held, exit_reason,
                   position_type, allocation_pct
            FROM backtest_results WHERE run_id = $1 ORDER BY id
            ",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(fatal)?;

        let trades = trade_rows
            .into_iter()
            .map(BacktestTradeRow::into_trade)
            .collect::<Result<Vec<_>, _>>()?;

        let mode: AllocationMode = run
            .mode
            .parse()
            .map_err(|e: String| EngineError::Fatal(anyhow::anyhow!(e)))?;

        Ok(BacktestReport {
            run_id: run.run_id,
            mode,
            start_date: run.start_date,
            end_date: run.end_date,
            starting_capital: run.starting_capital,
            ending_capital: run.ending_capital,
            hold_period_days: run.hold_period_days.max(0) as u32,
            created_at: run.created_at,
            trades,
            wins: run.wins.max(0) as usize,
            losses: run.losses.max(0) as usize,
            metrics: from_json(run.metrics)?,
            attribution: from_json(run.attribution)?,
            equity_curve: from_json(run.equity_curve)?,
            warnings: from_json(run.warnings)?,
        })
    }
}

fn fatal(err: sqlx::Error) -> EngineError {
    EngineError::Fatal(anyhow::Error::new(err))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, EngineError> {
    serde_json::to_value(value).map_err(|e| EngineError::Fatal(anyhow::Error::new(e)))
}

fn from_json<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, EngineError> {
    serde_json::from_value(value).map_err(|e| EngineError::Fatal(anyhow::Error::new(e)))
}

/// Wire name of a SCREAMING_SNAKE serde enum, for plain varchar columns.
fn serde_enum_name<T: serde::Serialize>(value: &T) -> Result<String, EngineError> {
    match serde_json::to_value(value).map_err(|e| EngineError::Fatal(anyhow::Error::new(e)))? {
        serde_json::Value::String(name) => Ok(name),
        other => Err(EngineError::Fatal(anyhow::anyhow!(
            "expected enum wire name, got {other}"
        ))),
    }
}
