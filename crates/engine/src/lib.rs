//! The transport-agnostic operation surface of the signal engine.
//!
//! One [`SignalEngine`] is constructed at process start and passed by
//! reference to whatever drives it (CLI today, an HTTP layer elsewhere).
//! Nothing here reaches for ambient globals; the breaker registry and the
//! caches live inside the collaborators built at construction time.

mod prices;

use chrono::{NaiveDate, Utc};
use parking_lot::RwLock;
use prices::AggregatorPrices;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use stocksense_aggregator::{BreakerRegistry, DataAggregator, ProviderError, RetryPolicy};
use stocksense_agents::llm::{
    AnthropicClient, CompletionClient, GeminiClient, OpenAiClient,
};
use stocksense_agents::{
    Agent, AgentInputs, AgentPanel, ContrarianAgent, GrowthAgent, MultiModalAgent, PredictorAgent,
};
use stocksense_backtest::BacktestEngine;
use stocksense_consensus::ConsensusEngine;
use stocksense_core::{
    AppConfig, BacktestReport, BacktestRequest, EngineError, SignalStatus, Ticker, Verdict,
};
use stocksense_data::{
    ArchiveRepository, BacktestRepository, SignalFilter, SignalRepository, SignalStatistics,
    WatchlistRepository,
};
use tokio::time::timeout;
use tracing::{info, warn};

/// A produced verdict plus everything degraded about producing it.
#[derive(Debug, Clone, Serialize)]
pub struct SignalReport {
    pub verdict: Verdict,
    pub warnings: Vec<String>,
}

/// Per-ticker outcome of a batch request.
#[derive(Debug, Serialize)]
pub struct BatchItem {
    pub ticker: String,
    pub report: Option<SignalReport>,
    pub error: Option<String>,
}

/// Owner of the full pipeline: aggregator -> panel -> consensus ->
/// persistence, plus backtest orchestration.
pub struct SignalEngine {
    config: AppConfig,
    aggregator: Arc<DataAggregator>,
    panel: AgentPanel,
    consensus: ConsensusEngine,
    signals: SignalRepository,
    backtests: BacktestRepository,
    watchlist: WatchlistRepository,
    archive: ArchiveRepository,
    /// Per-agent weights, swapped atomically between requests by the
    /// learning collaborator.
    weights: RwLock<BTreeMap<String, f64>>,
}

impl SignalEngine {
    /// Wires the engine from configuration and a connected pool.
    #[must_use]
    pub fn new(config: AppConfig, pool: PgPool) -> Self {
        let breakers = Arc::new(BreakerRegistry::new());
        let aggregator = Arc::new(DataAggregator::from_config(&config, Arc::clone(&breakers)));
        let panel = Self::build_panel(&config, &breakers);
        let consensus = ConsensusEngine::new(config.consensus.clone(), config.risk.clone());

        let weights = RwLock::new(Self::weight_map(&config));

        Self {
            aggregator,
            panel,
            consensus,
            signals: SignalRepository::new(pool.clone()),
            backtests: BacktestRepository::new(pool.clone()),
            watchlist: WatchlistRepository::new(pool.clone()),
            archive: ArchiveRepository::new(pool),
            weights,
            config,
        }
    }

    fn weight_map(config: &AppConfig) -> BTreeMap<String, f64> {
        let mut weights = BTreeMap::new();
        weights.insert("contrarian".to_string(), config.agents.contrarian);
        weights.insert("growth".to_string(), config.agents.growth);
        weights.insert("multimodal".to_string(), config.agents.multimodal);
        weights.insert("predictor".to_string(), config.agents.predictor);
        weights
    }

    fn build_panel(config: &AppConfig, breakers: &Arc<BreakerRegistry>) -> AgentPanel {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.llm.timeout_secs))
            .build()
            .unwrap_or_default();
        let retry = RetryPolicy::new(&config.retry);
        let thresholds = config.consensus.thresholds;
        let llm = &config.llm;

        let openai: Arc<dyn CompletionClient> = match &llm.openai_api_key {
            Some(key) => Arc::new(OpenAiClient::new(
                http.clone(),
                key.clone(),
                llm.openai_model.clone(),
                llm.max_tokens,
                breakers.get("openai", &config.breaker),
                retry.clone(),
            )),
            None => Arc::new(UnconfiguredClient { vendor: "openai" }),
        };
        let anthropic: Arc<dyn CompletionClient> = match &llm.anthropic_api_key {
            Some(key) => Arc::new(AnthropicClient::new(
                http.clone(),
                key.clone(),
                llm.anthropic_model.clone(),
                llm.max_tokens,
                breakers.get("anthropic", &config.breaker),
                retry.clone(),
            )),
            None => Arc::new(UnconfiguredClient {
                vendor: "anthropic",
            }),
        };
        let gemini: Arc<dyn CompletionClient> = match &llm.google_api_key {
            Some(key) => Arc::new(GeminiClient::new(
                http,
                key.clone(),
                llm.gemini_model.clone(),
                llm.max_tokens,
                breakers.get("gemini", &config.breaker),
                retry.clone(),
            )),
            None => Arc::new(UnconfiguredClient { vendor: "gemini" }),
        };

        let agents: Vec<Arc<dyn Agent>> = vec![
            Arc::new(ContrarianAgent::new(
                openai,
                config.agents.contrarian,
                thresholds,
            )),
            Arc::new(GrowthAgent::new(
                anthropic,
                config.agents.growth,
                thresholds,
            )),
            Arc::new(MultiModalAgent::new(
                gemini,
                config.agents.multimodal,
                thresholds,
            )),
            Arc::new(PredictorAgent::new(config.agents.predictor, thresholds)),
        ];

        AgentPanel::new(agents, Duration::from_secs(config.deadlines.panel_secs))
    }

    /// Replaces the per-agent weights for subsequent requests. In-flight
    /// requests keep the weights they started with.
    pub fn set_agent_weights(&self, weights: BTreeMap<String, f64>) {
        *self.weights.write() = weights;
    }

    /// Current per-agent weights.
    #[must_use]
    pub fn agent_weights(&self) -> BTreeMap<String, f64> {
        self.weights.read().clone()
    }

    /// Generates, persists, and returns one verdict for a ticker.
    ///
    /// The whole pipeline runs under the overall signal budget
    /// (`deadlines.signal_secs`); the agent panel gets whatever of that
    /// budget the aggregation left over, capped at its own deadline, so
    /// stragglers degrade to failed HOLDs and a consensus is still produced
    /// inside the budget.
    ///
    /// # Errors
    /// `BadInput` for an invalid ticker, `Fatal` when persistence fails,
    /// `Transient` when the overall budget elapses (a hung persistence or
    /// archive call). Degraded data never fails the request; it lands in
    /// `warnings`.
    pub async fn generate_signal(&self, raw_ticker: &str) -> Result<SignalReport, EngineError> {
        let ticker = Ticker::parse(raw_ticker)?;
        let budget = Duration::from_secs(self.config.deadlines.signal_secs);

        timeout(budget, self.generate_signal_inner(&ticker, budget))
            .await
            .map_err(|_| {
                EngineError::Transient(format!("signal deadline elapsed for {ticker}"))
            })?
    }

    async fn generate_signal_inner(
        &self,
        ticker: &Ticker,
        budget: Duration,
    ) -> Result<SignalReport, EngineError> {
        let started = tokio::time::Instant::now();
        info!(%ticker, "generating signal");

        let outcome = self.aggregator.fetch(ticker).await;
        let mut warnings = outcome.warnings;

        let inputs = AgentInputs {
            ticker: ticker.clone(),
            market: outcome.market,
            sentiment: outcome.sentiment,
        };
        // The overall budget bounds the panel deadline.
        let remaining = budget.saturating_sub(started.elapsed());
        let agent_verdicts = self.panel.run_within(&inputs, remaining).await;
        for verdict in agent_verdicts.iter().filter(|v| v.failed) {
            warnings.push(format!("{}: {}", verdict.agent_name, verdict.reasoning));
        }

        let weights = self.weights.read().clone();
        let mut verdict = self.consensus.decide(
            ticker,
            Utc::now(),
            inputs.market.current_price,
            agent_verdicts,
            &weights,
        );
        if inputs.market.current_price.is_none() {
            warnings.push("no quote available; verdict downgraded to HOLD".to_string());
        }

        let id = self.signals.save_verdict(&verdict).await?;
        verdict.id = Some(id);

        self.archive_fetch(&inputs).await;

        Ok(SignalReport { verdict, warnings })
    }

    /// Generates signals for a list of tickers, one outcome per ticker.
    /// A failing ticker never aborts the rest of the batch.
    pub async fn generate_batch(&self, tickers: &[String]) -> Vec<BatchItem> {
        let mut items = Vec::with_capacity(tickers.len());
        for raw in tickers {
            match self.generate_signal(raw).await {
                Ok(report) => items.push(BatchItem {
                    ticker: raw.clone(),
                    report: Some(report),
                    error: None,
                }),
                Err(err) => items.push(BatchItem {
                    ticker: raw.clone(),
                    report: None,
                    error: Some(err.to_string()),
                }),
            }
        }
        items
    }

    /// Filtered, paginated verdict listing.
    ///
    /// # Errors
    /// `Fatal` on persistence failure.
    pub async fn list_signals(&self, filter: &SignalFilter) -> Result<Vec<Verdict>, EngineError> {
        self.signals.list_verdicts(filter).await
    }

    /// Loads one verdict.
    ///
    /// # Errors
    /// `BadInput` for an unknown id.
    pub async fn get_signal(&self, id: i64) -> Result<Verdict, EngineError> {
        self.signals.load_verdict(id).await
    }

    /// Applies a status transition.
    ///
    /// # Errors
    /// `InvalidState` for an illegal transition, `BadInput` for an unknown
    /// id.
    pub async fn update_signal_status(
        &self,
        id: i64,
        new_status: SignalStatus,
        pnl: Option<Decimal>,
        notes: Option<String>,
    ) -> Result<Verdict, EngineError> {
        self.signals.update_status(id, new_status, pnl, notes).await
    }

    /// Signal statistics over a lookback window.
    ///
    /// # Errors
    /// `Fatal` on persistence failure.
    pub async fn statistics(&self, period_days: i64) -> Result<SignalStatistics, EngineError> {
        self.signals.statistics(period_days).await
    }

    /// Active watchlist tickers.
    ///
    /// # Errors
    /// `Fatal` on persistence failure.
    pub async fn active_watchlist(&self) -> Result<Vec<Ticker>, EngineError> {
        self.watchlist.active_tickers().await
    }

    /// Runs one backtest over persisted BUY verdicts and saves the report.
    ///
    /// # Errors
    /// `BadInput` / `InvalidState` per the backtest engine; `Transient` when
    /// the run exceeds its deadline (partial results are discarded).
    pub async fn run_backtest(
        &self,
        request: &BacktestRequest,
    ) -> Result<BacktestReport, EngineError> {
        let selection = self.load_selection(request).await?;
        let prices = AggregatorPrices::new(Arc::clone(&self.aggregator));
        let budget = Duration::from_secs(self.config.deadlines.backtest_secs);

        let report = timeout(budget, BacktestEngine::run(request, selection, &prices))
            .await
            .map_err(|_| EngineError::Transient("backtest deadline elapsed".into()))??;

        self.backtests.save_backtest(&report).await?;
        Ok(report)
    }

    /// Runs all three allocation modes over the same selection, saving each
    /// report.
    ///
    /// # Errors
    /// Same conditions as [`SignalEngine::run_backtest`].
    pub async fn compare_backtest_modes(
        &self,
        request: &BacktestRequest,
    ) -> Result<Vec<BacktestReport>, EngineError> {
        let selection = self.load_selection(request).await?;
        let prices = AggregatorPrices::new(Arc::clone(&self.aggregator));
        let budget = Duration::from_secs(self.config.deadlines.backtest_secs);

        let reports = timeout(
            budget,
            BacktestEngine::compare_modes(request, selection, &prices),
        )
        .await
        .map_err(|_| EngineError::Transient("backtest deadline elapsed".into()))??;

        for report in &reports {
            self.backtests.save_backtest(report).await?;
        }
        Ok(reports)
    }

    /// Loads a previously saved backtest report.
    ///
    /// # Errors
    /// `BadInput` for an unknown run id.
    pub async fn get_backtest(&self, run_id: uuid::Uuid) -> Result<BacktestReport, EngineError> {
        self.backtests.load_backtest(run_id).await
    }

    async fn load_selection(
        &self,
        request: &BacktestRequest,
    ) -> Result<Vec<Verdict>, EngineError> {
        let start = day_start(request.start_date)?;
        let end = day_end(request.end_date)?;
        self.signals
            .list_buy_verdicts_between(start, end, request.tickers.as_deref())
            .await
    }

    /// Best-effort archival of the fetched data; failures are logged, never
    /// surfaced.
    async fn archive_fetch(&self, inputs: &AgentInputs) {
        if let Some(source) = inputs.market.source_used {
            if !inputs.market.historical.is_empty() {
                if let Err(err) = self
                    .archive
                    .archive_market(&inputs.ticker, source, &inputs.market.historical)
                    .await
                {
                    warn!(ticker = %inputs.ticker, error = %err, "market archive failed");
                }
            }
        }
        if inputs.sentiment.available {
            if let Err(err) = self.archive.archive_sentiment(&inputs.sentiment).await {
                warn!(ticker = %inputs.ticker, error = %err, "sentiment archive failed");
            }
        }
    }
}

/// Stand-in for an LLM vendor with no configured credentials; every call
/// fails fast and the owning agent reports a failed verdict.
struct UnconfiguredClient {
    vendor: &'static str,
}

#[async_trait::async_trait]
impl CompletionClient for UnconfiguredClient {
    fn vendor(&self) -> &str {
        self.vendor
    }

    async fn complete(&self, _system: &str, _user: &str) -> Result<String, ProviderError> {
        Err(ProviderError::NotConfigured {
            provider: self.vendor.to_string(),
        })
    }
}

fn day_start(date: NaiveDate) -> Result<chrono::DateTime<Utc>, EngineError> {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| EngineError::BadInput(format!("invalid date {date}")))
}

fn day_end(date: NaiveDate) -> Result<chrono::DateTime<Utc>, EngineError> {
    date.and_hms_opt(23, 59, 59)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| EngineError::BadInput(format!("invalid date {date}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_bounds_cover_the_whole_day() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let start = day_start(date).unwrap();
        let end = day_end(date).unwrap();
        assert!(start < end);
        assert_eq!(start.date_naive(), date);
        assert_eq!(end.date_naive(), date);
    }
}
