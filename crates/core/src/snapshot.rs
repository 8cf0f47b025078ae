//! Per-request market and sentiment snapshots.
//!
//! Snapshots are immutable bundles assembled by the data aggregator. Missing
//! fields are represented explicitly (`Option` / `available` flags) so agents
//! can apply their own defaults instead of guessing.

use crate::ticker::Ticker;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Weight of the Reddit leg when both sentiment sources respond.
pub const REDDIT_SENTIMENT_WEIGHT: f64 = 0.6;
/// Weight of the news leg when both sentiment sources respond.
pub const NEWS_SENTIMENT_WEIGHT: f64 = 0.4;

/// One daily OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}

/// Which market provider delivered a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketSource {
    Polygon,
    Finnhub,
    AlphaVantage,
}

impl fmt::Display for MarketSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Polygon => "polygon",
            Self::Finnhub => "finnhub",
            Self::AlphaVantage => "alphavantage",
        };
        f.write_str(label)
    }
}

/// Direction of recent volume relative to the prior window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VolumeTrend {
    Increasing,
    Decreasing,
    Neutral,
    #[default]
    Unknown,
}

/// Market inputs for one ticker at one instant.
///
/// Invariant: `current_price` is `Some` only when a provider responded
/// successfully or a non-expired cache entry was returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub ticker: Ticker,
    pub as_of: DateTime<Utc>,
    /// Last trade price; absent when the whole quote chain failed.
    pub current_price: Option<Decimal>,
    /// Daily bars, newest first. At most 100.
    pub historical: Vec<DailyBar>,
    /// Indicator name -> value. `rsi` (0-100) is the only required key when
    /// any indicator source responded.
    pub indicators: BTreeMap<String, f64>,
    pub volume_trend: VolumeTrend,
    /// Provider that delivered the quote, if any.
    pub source_used: Option<MarketSource>,
}

impl MarketSnapshot {
    /// Creates an empty snapshot with every field absent.
    #[must_use]
    pub fn empty(ticker: Ticker, as_of: DateTime<Utc>) -> Self {
        Self {
            ticker,
            as_of,
            current_price: None,
            historical: Vec::new(),
            indicators: BTreeMap::new(),
            volume_trend: VolumeTrend::Unknown,
            source_used: None,
        }
    }

    /// RSI if present, clamped into [0, 100].
    #[must_use]
    pub fn rsi(&self) -> Option<f64> {
        self.indicators.get("rsi").map(|v| v.clamp(0.0, 100.0))
    }
}

/// Sentiment extracted from one social source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SocialSentiment {
    pub mentions: u32,
    /// Lexicon score in [-1, 1].
    pub score: f64,
    pub available: bool,
}

/// Sentiment extracted from news coverage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewsSentiment {
    pub article_count: u32,
    /// Lexicon score in [-1, 1].
    pub score: f64,
    pub available: bool,
    /// Up to five recent headlines, newest first.
    pub headlines: Vec<String>,
}

/// Combined sentiment inputs for one ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentSnapshot {
    pub ticker: Ticker,
    pub as_of: DateTime<Utc>,
    /// Weighted blend of the available sources, in [-1, 1].
    pub combined_sentiment: f64,
    /// False when neither source responded.
    pub available: bool,
    pub reddit: SocialSentiment,
    pub news: NewsSentiment,
}

impl SentimentSnapshot {
    /// Combines the two sources: 0.6/0.4 Reddit/news when both are available,
    /// full weight to the survivor when one is missing, zero when both are.
    #[must_use]
    pub fn combine(
        ticker: Ticker,
        as_of: DateTime<Utc>,
        reddit: SocialSentiment,
        news: NewsSentiment,
    ) -> Self {
        let combined = match (reddit.available, news.available) {
            (true, true) => {
                REDDIT_SENTIMENT_WEIGHT * reddit.score + NEWS_SENTIMENT_WEIGHT * news.score
            }
            (true, false) => reddit.score,
            (false, true) => news.score,
            (false, false) => 0.0,
        };

        Self {
            ticker,
            as_of,
            combined_sentiment: combined.clamp(-1.0, 1.0),
            available: reddit.available || news.available,
            reddit,
            news,
        }
    }

    /// Creates a snapshot with both sources marked unavailable.
    #[must_use]
    pub fn unavailable(ticker: Ticker, as_of: DateTime<Utc>) -> Self {
        Self::combine(
            ticker,
            as_of,
            SocialSentiment::default(),
            NewsSentiment::default(),
        )
    }

    /// Total mentions across both sources.
    #[must_use]
    pub fn total_mentions(&self) -> u32 {
        self.reddit.mentions + self.news.article_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ticker() -> Ticker {
        Ticker::parse("NVDA").unwrap()
    }

    #[test]
    fn combine_weights_both_sources() {
        let snapshot = SentimentSnapshot::combine(
            ticker(),
            Utc::now(),
            SocialSentiment {
                mentions: 12,
                score: 0.5,
                available: true,
            },
            NewsSentiment {
                article_count: 4,
                score: -0.5,
                available: true,
                headlines: vec![],
            },
        );
        // 0.6 * 0.5 + 0.4 * -0.5 = 0.1
        assert!((snapshot.combined_sentiment - 0.1).abs() < 1e-9);
        assert!(snapshot.available);
        assert_eq!(snapshot.total_mentions(), 16);
    }

    #[test]
    fn combine_gives_full_weight_to_single_source() {
        let snapshot = SentimentSnapshot::combine(
            ticker(),
            Utc::now(),
            SocialSentiment::default(),
            NewsSentiment {
                article_count: 2,
                score: -0.8,
                available: true,
                headlines: vec![],
            },
        );
        assert!((snapshot.combined_sentiment + 0.8).abs() < 1e-9);
        assert!(snapshot.available);
    }

    #[test]
    fn combine_with_no_sources_is_neutral_and_unavailable() {
        let snapshot = SentimentSnapshot::unavailable(ticker(), Utc::now());
        assert_eq!(snapshot.combined_sentiment, 0.0);
        assert!(!snapshot.available);
    }

    #[test]
    fn combine_clamps_out_of_range_blend() {
        let snapshot = SentimentSnapshot::combine(
            ticker(),
            Utc::now(),
            SocialSentiment {
                mentions: 1,
                score: 2.5,
                available: true,
            },
            NewsSentiment::default(),
        );
        assert!((snapshot.combined_sentiment - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_snapshot_has_no_fields() {
        let snapshot = MarketSnapshot::empty(ticker(), Utc::now());
        assert!(snapshot.current_price.is_none());
        assert!(snapshot.historical.is_empty());
        assert!(snapshot.rsi().is_none());
        assert_eq!(snapshot.volume_trend, VolumeTrend::Unknown);
        assert!(snapshot.source_used.is_none());
    }

    #[test]
    fn rsi_is_clamped() {
        let mut snapshot = MarketSnapshot::empty(ticker(), Utc::now());
        snapshot.indicators.insert("rsi".into(), 140.0);
        assert_eq!(snapshot.rsi(), Some(100.0));
        snapshot.indicators.insert("rsi".into(), -5.0);
        assert_eq!(snapshot.rsi(), Some(0.0));
    }

    #[test]
    fn daily_bar_serde_round_trip() {
        let bar = DailyBar {
            date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            open: dec!(101.20),
            high: dec!(104.00),
            low: dec!(100.55),
            close: dec!(103.10),
            volume: 1_250_000,
        };
        let json = serde_json::to_string(&bar).unwrap();
        let back: DailyBar = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bar);
    }
}
