//! Provider adapters.
//!
//! Market providers satisfy the same three operations and are tried in chain
//! order; sentiment providers are independent and optional. Every adapter
//! owns its token bucket and exposes a `with_base_url` seam for tests.

pub mod alpha_vantage;
pub mod finnhub;
pub mod newsapi;
pub mod polygon;
pub mod reddit;

use crate::error::ProviderError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fmt;
use stocksense_core::{DailyBar, MarketSource, NewsSentiment, SocialSentiment, Ticker};

pub use alpha_vantage::AlphaVantageProvider;
pub use finnhub::FinnhubProvider;
pub use newsapi::NewsApiProvider;
pub use polygon::PolygonProvider;
pub use reddit::RedditProvider;

/// The three market-data operations served by the provider chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketOperation {
    Quote,
    Historical,
    Indicators,
}

impl fmt::Display for MarketOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Quote => "quote",
            Self::Historical => "historical",
            Self::Indicators => "indicators",
        };
        f.write_str(label)
    }
}

/// A quote response: last price plus optional daily change percent.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub price: Decimal,
    pub change_percent: Option<f64>,
}

/// One market data vendor.
#[async_trait]
pub trait MarketProvider: Send + Sync {
    fn source(&self) -> MarketSource;

    /// Fetches the latest price.
    async fn quote(&self, ticker: &Ticker) -> Result<Quote, ProviderError>;

    /// Fetches up to `days` daily bars, newest first.
    async fn historical(&self, ticker: &Ticker, days: u32) -> Result<Vec<DailyBar>, ProviderError>;

    /// Fetches technical indicators; `rsi` is the expected key.
    async fn indicators(&self, ticker: &Ticker) -> Result<BTreeMap<String, f64>, ProviderError>;
}

/// News coverage sentiment source.
#[async_trait]
pub trait NewsProvider: Send + Sync {
    async fn news(&self, ticker: &Ticker) -> Result<NewsSentiment, ProviderError>;
}

/// Social chatter sentiment source.
#[async_trait]
pub trait SocialProvider: Send + Sync {
    async fn social(&self, ticker: &Ticker) -> Result<SocialSentiment, ProviderError>;
}

/// Maps a non-success HTTP response to a `ProviderError`, reading the body
/// for the log message.
pub(crate) async fn error_for_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Http {
        status: status.as_u16(),
        body: body.chars().take(200).collect(),
    })
}
