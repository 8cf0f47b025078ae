//! Row types mapping between tables and core value types.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use std::collections::BTreeMap;
use stocksense_core::{
    AgentVerdict, BacktestTrade, EngineError, ExitReason, PositionType, SignalLevel, SignalStatus,
    SignalType, Ticker, TradeResult, Verdict,
};

#[derive(Debug, FromRow)]
pub struct SignalRow {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub ticker: String,
    pub signal_type: String,
    pub confidence: f64,
    pub entry_price: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub position_size: i64,
    pub status: String,
    pub executed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub pnl: Option<Decimal>,
    pub notes: Option<String>,
}

impl SignalRow {
    /// Reassembles a verdict from its row plus ordered analysis rows.
    ///
    /// # Errors
    /// Returns `Fatal` when stored enum strings no longer parse; that is
    /// data corruption, not caller error.
    pub fn into_verdict(self, analyses: Vec<AgentAnalysisRow>) -> Result<Verdict, EngineError> {
        let signal_type: SignalType = self
            .signal_type
            .parse()
            .map_err(|e: String| EngineError::Fatal(anyhow::anyhow!(e)))?;
        let status: SignalStatus = self.status.parse()?;
        let ticker = Ticker::parse(&self.ticker)?;

        let agent_verdicts = analyses
            .into_iter()
            .map(AgentAnalysisRow::into_agent_verdict)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Verdict {
            id: Some(self.id),
            ticker,
            created_at: self.created_at,
            signal_type,
            confidence: self.confidence,
            entry_price: self.entry_price,
            stop_loss: self.stop_loss,
            target_price: self.target_price,
            position_size: self.position_size,
            status,
            pnl: self.pnl,
            notes: self.notes,
            agent_verdicts,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct AgentAnalysisRow {
    pub signal_id: i64,
    pub ordinal: i32,
    pub agent_name: String,
    pub recommendation: String,
    pub raw_score: f64,
    pub confidence: f64,
    pub reasoning: String,
    pub data_used: Option<serde_json::Value>,
    pub failed: bool,
}

impl AgentAnalysisRow {
    fn into_agent_verdict(self) -> Result<AgentVerdict, EngineError> {
        let signal: SignalLevel = self
            .recommendation
            .parse()
            .map_err(|e: String| EngineError::Fatal(anyhow::anyhow!(e)))?;
        let data_used: BTreeMap<String, f64> = match self.data_used {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| EngineError::Fatal(anyhow::Error::new(e)))?,
            None => BTreeMap::new(),
        };
        Ok(AgentVerdict {
            agent_name: self.agent_name,
            signal,
            raw_score: self.raw_score,
            confidence: self.confidence,
            reasoning: self.reasoning,
            data_used,
            failed: self.failed,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct BacktestTradeRow {
    pub signal_id: i64,
    pub ticker: String,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub shares: i64,
    pub pnl: Decimal,
    pub pnl_pct: Decimal,
    pub trade_result: String,
    pub days_held: i32,
    pub exit_reason: String,
    pub position_type: String,
    pub allocation_pct: Decimal,
}

impl BacktestTradeRow {
    /// # Errors
    /// Returns `Fatal` when stored enum strings no longer parse.
    pub fn into_trade(self) -> Result<BacktestTrade, EngineError> {
        let parse_fatal = |e: serde_json::Error| EngineError::Fatal(anyhow::Error::new(e));
        // Wire names are SCREAMING_SNAKE; reuse the serde definitions.
        let result: TradeResult =
            serde_json::from_value(serde_json::Value::String(self.trade_result))
                .map_err(parse_fatal)?;
        let exit_reason: ExitReason =
            serde_json::from_value(serde_json::Value::String(self.exit_reason))
                .map_err(parse_fatal)?;
        let position_type: PositionType =
            serde_json::from_value(serde_json::Value::String(self.position_type))
                .map_err(parse_fatal)?;

        Ok(BacktestTrade {
            signal_id: self.signal_id,
            ticker: Ticker::parse(&self.ticker)?,
            entry_date: self.entry_date,
            exit_date: self.exit_date,
            entry_price: self.entry_price,
            exit_price: self.exit_price,
            shares: self.shares,
            pnl: self.pnl,
            pnl_pct: self.pnl_pct,
            result,
            days_held: i64::from(self.days_held),
            exit_reason,
            position_type,
            allocation_pct: self.allocation_pct,
        })
    }
}
