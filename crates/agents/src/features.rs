//! Feature extraction from snapshots, with the shared edge-case policy.
//!
//! Missing RSI defaults to a neutral 50, missing sentiment to 0, a missing
//! historical series to zero momentum and an unknown volume trend;
//! out-of-range inputs are clamped silently.

use rust_decimal::Decimal;
use stocksense_aggregator::indicators;
use stocksense_core::{MarketSnapshot, SentimentSnapshot, VolumeTrend};

/// Neutral RSI assumed when no source provided one.
pub const NEUTRAL_RSI: f64 = 50.0;

/// Numeric inputs the agents act on, already defaulted and clamped.
#[derive(Debug, Clone)]
pub struct AgentFeatures {
    pub current_price: Option<Decimal>,
    /// RSI in [0, 100]; `NEUTRAL_RSI` when unavailable.
    pub rsi: f64,
    pub rsi_available: bool,
    /// Combined sentiment in [-1, 1]; 0 when unavailable.
    pub sentiment: f64,
    pub sentiment_available: bool,
    /// 7-day price change percent; 0 without history.
    pub momentum_7d: f64,
    /// 30-day price change percent; 0 without history.
    pub momentum_30d: f64,
    pub volume_trend: VolumeTrend,
    pub total_mentions: u32,
    /// Recent headlines for prompt context.
    pub headlines: Vec<String>,
}

impl AgentFeatures {
    #[must_use]
    pub fn extract(market: &MarketSnapshot, sentiment: &SentimentSnapshot) -> Self {
        let rsi = market.rsi();
        let momentum = |key: &str, days: usize| {
            market
                .indicators
                .get(key)
                .copied()
                .or_else(|| indicators::price_change_pct(&market.historical, days))
                .unwrap_or(0.0)
        };

        Self {
            current_price: market.current_price,
            rsi: rsi.unwrap_or(NEUTRAL_RSI),
            rsi_available: rsi.is_some(),
            sentiment: if sentiment.available {
                sentiment.combined_sentiment.clamp(-1.0, 1.0)
            } else {
                0.0
            },
            sentiment_available: sentiment.available,
            momentum_7d: momentum("price_change_7d", 7),
            momentum_30d: momentum("price_change_30d", 30),
            volume_trend: if market.historical.is_empty() {
                VolumeTrend::Unknown
            } else {
                market.volume_trend
            },
            total_mentions: sentiment.total_mentions(),
            headlines: sentiment.news.headlines.clone(),
        }
    }

    /// Price formatted for prompts; "unavailable" without a quote.
    #[must_use]
    pub fn price_label(&self) -> String {
        self.current_price
            .map_or_else(|| "unavailable".to_string(), |p| format!("${p}"))
    }

    /// Volume trend as a prompt-friendly word.
    #[must_use]
    pub fn volume_label(&self) -> &'static str {
        match self.volume_trend {
            VolumeTrend::Increasing => "increasing",
            VolumeTrend::Decreasing => "decreasing",
            VolumeTrend::Neutral => "neutral",
            VolumeTrend::Unknown => "unknown",
        }
    }
}
