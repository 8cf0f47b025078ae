//! Verdict persistence: save, load, filtered listing, status lifecycle,
//! and summary statistics.

use crate::models::{AgentAnalysisRow, SignalRow};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::BTreeMap;
use std::collections::HashMap;
use stocksense_core::{EngineError, SignalStatus, SignalType, Ticker, Verdict};
use tracing::info;

const SELECT_SIGNAL: &str = "SELECT id, created_at, ticker, signal_type, confidence, \
     entry_price, target_price, stop_loss, position_size, status, executed_at, closed_at, \
     pnl, notes FROM signals";

const SELECT_ANALYSIS: &str = "SELECT signal_id, ordinal, agent_name, recommendation, \
     raw_score, confidence, reasoning, data_used, failed FROM agent_analysis";

/// Listing filters; `None` means no constraint.
#[derive(Debug, Clone)]
pub struct SignalFilter {
    pub ticker: Option<Ticker>,
    pub signal_type: Option<SignalType>,
    pub status: Option<SignalStatus>,
    /// Only verdicts created within the last N days.
    pub window_days: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for SignalFilter {
    fn default() -> Self {
        Self {
            ticker: None,
            signal_type: None,
            status: None,
            window_days: None,
            limit: 100,
            offset: 0,
        }
    }
}

/// Summary over a lookback window.
#[derive(Debug, Clone)]
pub struct SignalStatistics {
    pub period_days: i64,
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub closed: usize,
    pub win_rate: Option<f64>,
    pub average_pnl: Option<Decimal>,
}

/// Repository for the `signals` and `agent_analysis` tables.
#[derive(Debug, Clone)]
pub struct SignalRepository {
    pool: PgPool,
}

impl SignalRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persists a verdict and its agent analyses in one transaction,
    /// upserting the watchlist row the FK needs. Returns the assigned id.
    ///
    /// # Errors
    /// `Fatal` on database failure or when an agent verdict carries empty
    /// reasoning (which must never be persisted).
    pub async fn save_verdict(&self, verdict: &Verdict) -> Result<i64, EngineError> {
        if verdict
            .agent_verdicts
            .iter()
            .any(|v| v.reasoning.trim().is_empty())
        {
            return Err(EngineError::Fatal(anyhow::anyhow!(
                "agent verdict with empty reasoning for {}",
                verdict.ticker
            )));
        }

        let mut tx = self.pool.begin().await.map_err(fatal)?;

        sqlx::query("INSERT INTO watchlist (ticker) VALUES ($1) ON CONFLICT (ticker) DO NOTHING")
            .bind(verdict.ticker.as_str())
            .execute(&mut *tx)
            .await
            .map_err(fatal)?;

        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO signals
                (created_at, ticker, signal_type, confidence, entry_price, target_price,
                 stop_loss, position_size, status, pnl, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            ",
        )
        .bind(verdict.created_at)
        .bind(verdict.ticker.as_str())
        .bind(verdict.signal_type.to_string())
        .bind(verdict.confidence)
        .bind(verdict.entry_price)
        .bind(verdict.target_price)
        .bind(verdict.stop_loss)
        .bind(verdict.position_size)
        .bind(verdict.status.to_string())
        .bind(verdict.pnl)
        .bind(&verdict.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(fatal)?;

        for (ordinal, agent) in verdict.agent_verdicts.iter().enumerate() {
            let data_used =
                serde_json::to_value(&agent.data_used).map_err(|e| fatal_any(e.into()))?;
            sqlx::query(
                r"
                INSERT INTO agent_analysis
                    (signal_id, ordinal, agent_name, recommendation, raw_score,
                     confidence, reasoning, data_used, failed)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ",
            )
            .bind(id)
            .bind(ordinal as i32)
            .bind(&agent.agent_name)
            .bind(agent.signal.to_string())
            .bind(agent.raw_score)
            .bind(agent.confidence)
            .bind(&agent.reasoning)
            .bind(data_used)
            .bind(agent.failed)
            .execute(&mut *tx)
            .await
            .map_err(fatal)?;
        }

        tx.commit().await.map_err(fatal)?;
        info!(
            signal_id = id,
            ticker = %verdict.ticker,
            signal = %verdict.signal_type,
            "saved verdict"
        );
        Ok(id)
    }

    /// Loads one verdict with its analyses.
    ///
    /// # Errors
    /// `BadInput` for an unknown id, `Fatal` on database failure.
    pub async fn load_verdict(&self, id: i64) -> Result<Verdict, EngineError> {
        let row: Option<SignalRow> =
            sqlx::query_as(&format!("{SELECT_SIGNAL} WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(fatal)?;
        let row = row.ok_or_else(|| EngineError::BadInput(format!("signal {id} not found")))?;

        let analyses: Vec<AgentAnalysisRow> = sqlx::query_as(&format!(
            "{SELECT_ANALYSIS} WHERE signal_id = $1 ORDER BY ordinal"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(fatal)?;

        row.into_verdict(analyses)
    }

    /// Lists verdicts matching the filter, newest first.
    ///
    /// # Errors
    /// `Fatal` on database failure.
    pub async fn list_verdicts(&self, filter: &SignalFilter) -> Result<Vec<Verdict>, EngineError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("{SELECT_SIGNAL} WHERE TRUE"));
        if let Some(ticker) = &filter.ticker {
            builder.push(" AND ticker = ").push_bind(ticker.as_str());
        }
        if let Some(signal_type) = filter.signal_type {
            builder
                .push(" AND signal_type = ")
                .push_bind(signal_type.to_string());
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.to_string());
        }
        if let Some(days) = filter.window_days {
            let since = Utc::now() - Duration::days(days.max(0));
            builder.push(" AND created_at >= ").push_bind(since);
        }
        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(filter.limit.clamp(1, 1_000))
            .push(" OFFSET ")
            .push_bind(filter.offset.max(0));

        let rows: Vec<SignalRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(fatal)?;
        self.attach_analyses(rows).await
    }

    /// BUY verdicts created inside a date window, oldest first; the backtest
    /// selection query.
    ///
    /// # Errors
    /// `Fatal` on database failure.
    pub async fn list_buy_verdicts_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        tickers: Option<&[Ticker]>,
    ) -> Result<Vec<Verdict>, EngineError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "{SELECT_SIGNAL} WHERE signal_type = 'BUY' AND created_at >= "
        ));
        builder.push_bind(start);
        builder.push(" AND created_at <= ").push_bind(end);
        if let Some(tickers) = tickers {
            let symbols: Vec<&str> = tickers.iter().map(Ticker::as_str).collect();
            builder.push(" AND ticker = ANY(").push_bind(symbols).push(")");
        }
        builder.push(" ORDER BY created_at ASC, id ASC");

        let rows: Vec<SignalRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(fatal)?;
        self.attach_analyses(rows).await
    }

    /// Applies a status transition, stamping `executed_at` / `closed_at` and
    /// attaching P&L at close.
    ///
    /// # Errors
    /// `BadInput` for an unknown id, `InvalidState` for an illegal
    /// transition (including repeating the current status), `Fatal` on
    /// database failure.
    pub async fn update_status(
        &self,
        id: i64,
        new_status: SignalStatus,
        pnl: Option<Decimal>,
        notes: Option<String>,
    ) -> Result<Verdict, EngineError> {
        let mut tx = self.pool.begin().await.map_err(fatal)?;

        let row: Option<(String,)> =
            sqlx::query_as("SELECT status FROM signals WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(fatal)?;
        let (current,) =
            row.ok_or_else(|| EngineError::BadInput(format!("signal {id} not found")))?;
        let current: SignalStatus = current.parse()?;
        current.transition_to(new_status)?;

        let now = Utc::now();
        let executed_at = (new_status == SignalStatus::Executed).then_some(now);
        let closed_at = (new_status == SignalStatus::Closed).then_some(now);
        let pnl = pnl.filter(|_| new_status == SignalStatus::Closed);

        sqlx::query(
            r"
            UPDATE signals
            SET status = $2,
                executed_at = COALESCE($3, executed_at),
                closed_at = COALESCE($4, closed_at),
                pnl = COALESCE($5, pnl),
                notes = COALESCE($6, notes)
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(new_status.to_string())
        .bind(executed_at)
        .bind(closed_at)
        .bind(pnl)
        .bind(notes)
        .execute(&mut *tx)
        .await
        .map_err(fatal)?;

        tx.commit().await.map_err(fatal)?;
        info!(signal_id = id, status = %new_status, "updated signal status");
        self.load_verdict(id).await
    }

    /// Counts and win-rate summary over the lookback window.
    ///
    /// # Errors
    /// `Fatal` on database failure.
    pub async fn statistics(&self, period_days: i64) -> Result<SignalStatistics, EngineError> {
        let since = Utc::now() - Duration::days(period_days.max(0));
        let rows: Vec<(String, String, Option<Decimal>)> = sqlx::query_as(
            "SELECT signal_type, status, pnl FROM signals WHERE created_at >= $1",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(fatal)?;

        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
        let mut closed_pnls: Vec<Decimal> = Vec::new();

        for (signal_type, status, pnl) in &rows {
            *by_type.entry(signal_type.clone()).or_default() += 1;
            *by_status.entry(status.clone()).or_default() += 1;
            if status == "CLOSED" {
                if let Some(pnl) = pnl {
                    closed_pnls.push(*pnl);
                }
            }
        }

        let (win_rate, average_pnl) = if closed_pnls.is_empty() {
            (None, None)
        } else {
            let wins = closed_pnls.iter().filter(|p| **p > Decimal::ZERO).count();
            let total: Decimal = closed_pnls.iter().copied().sum();
            (
                Some(wins as f64 / closed_pnls.len() as f64),
                Some(total / Decimal::from(closed_pnls.len() as i64)),
            )
        };

        Ok(SignalStatistics {
            period_days,
            total: rows.len(),
            by_type,
            by_status,
            closed: closed_pnls.len(),
            win_rate,
            average_pnl,
        })
    }

    async fn attach_analyses(
        &self,
        rows: Vec<SignalRow>,
    ) -> Result<Vec<Verdict>, EngineError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let analyses: Vec<AgentAnalysisRow> = sqlx::query_as(&format!(
            "{SELECT_ANALYSIS} WHERE signal_id = ANY($1) ORDER BY signal_id, ordinal"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(fatal)?;

        let mut grouped: HashMap<i64, Vec<AgentAnalysisRow>> = HashMap::new();
        for analysis in analyses {
            grouped.entry(analysis.signal_id).or_default().push(analysis);
        }

        rows.into_iter()
            .map(|row| {
                let analyses = grouped.remove(&row.id).unwrap_or_default();
                row.into_verdict(analyses)
            })
            .collect()
    }
}

fn fatal(err: sqlx::Error) -> EngineError {
    EngineError::Fatal(anyhow::Error::new(err))
}

fn fatal_any(err: anyhow::Error) -> EngineError {
    EngineError::Fatal(err)
}
