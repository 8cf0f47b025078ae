//! Alpha Vantage adapter (tertiary market provider).
//!
//! Alpha Vantage reports its free-tier throttling as a 200 response with a
//! "Note"/"Information" body; that is surfaced as `RateLimited` so the retry
//! and breaker logic treats it like any other 429.

use crate::error::ProviderError;
use crate::providers::{error_for_status, MarketProvider, Quote};
use crate::rate_limit::ProviderLimiter;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use stocksense_core::{DailyBar, MarketSource, Ticker};
use tracing::debug;

/// Production API base.
pub const ALPHA_VANTAGE_API_URL: &str = "https://www.alphavantage.co";

pub struct AlphaVantageProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    limiter: ProviderLimiter,
}

impl AlphaVantageProvider {
    #[must_use]
    pub fn new(http: reqwest::Client, api_key: String, limiter: ProviderLimiter) -> Self {
        Self {
            http,
            base_url: ALPHA_VANTAGE_API_URL.to_string(),
            api_key,
            limiter,
        }
    }

    /// Overrides the API base URL (tests).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn query(&self, params: &[(&str, &str)]) -> Result<Value, ProviderError> {
        self.limiter.acquire()?;
        let url = format!("{}/query", self.base_url);
        debug!(provider = "alphavantage", %url, "GET");
        let response = self
            .http
            .get(&url)
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await?;
        let response = error_for_status(response).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        // Throttling arrives as 200 with an explanatory body.
        if body.get("Note").is_some() || body.get("Information").is_some() {
            return Err(ProviderError::RateLimited);
        }
        if let Some(message) = body.get("Error Message").and_then(Value::as_str) {
            return Err(ProviderError::Malformed(message.chars().take(120).collect()));
        }
        Ok(body)
    }

    fn parse_decimal(raw: &str) -> Option<Decimal> {
        Decimal::from_str(raw.trim()).ok()
    }
}

#[async_trait]
impl MarketProvider for AlphaVantageProvider {
    fn source(&self) -> MarketSource {
        MarketSource::AlphaVantage
    }

    async fn quote(&self, ticker: &Ticker) -> Result<Quote, ProviderError> {
        let symbol = ticker.to_string();
        let body = self
            .query(&[("function", "GLOBAL_QUOTE"), ("symbol", &symbol)])
            .await?;
        let quote = body
            .get("Global Quote")
            .and_then(Value::as_object)
            .ok_or_else(|| ProviderError::Malformed("missing Global Quote".into()))?;

        let price = quote
            .get("05. price")
            .and_then(Value::as_str)
            .and_then(Self::parse_decimal)
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| ProviderError::Malformed("missing price".into()))?;

        let change_percent = quote
            .get("10. change percent")
            .and_then(Value::as_str)
            .and_then(|s| s.trim_end_matches('%').parse::<f64>().ok());

        Ok(Quote {
            price,
            change_percent,
        })
    }

    async fn historical(&self, ticker: &Ticker, days: u32) -> Result<Vec<DailyBar>, ProviderError> {
        let symbol = ticker.to_string();
        let body = self
            .query(&[
                ("function", "TIME_SERIES_DAILY"),
                ("symbol", &symbol),
                ("outputsize", "compact"),
            ])
            .await?;
        let series = body
            .get("Time Series (Daily)")
            .and_then(Value::as_object)
            .ok_or_else(|| ProviderError::Malformed("missing time series".into()))?;

        let mut bars: Vec<DailyBar> = Vec::with_capacity(series.len());
        for (date_str, values) in series {
            let Ok(date) = NaiveDate::from_str(date_str) else {
                continue;
            };
            let field = |key: &str| {
                values
                    .get(key)
                    .and_then(Value::as_str)
                    .and_then(Self::parse_decimal)
            };
            let (Some(open), Some(high), Some(low), Some(close)) = (
                field("1. open"),
                field("2. high"),
                field("3. low"),
                field("4. close"),
            ) else {
                continue;
            };
            let volume = values
                .get("5. volume")
                .and_then(Value::as_str)
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0);
            bars.push(DailyBar {
                date,
                open,
                high,
                low,
                close,
                volume,
            });
        }

        if bars.is_empty() {
            return Err(ProviderError::Malformed("no daily bars".into()));
        }
        bars.sort_by(|a, b| b.date.cmp(&a.date));
        bars.truncate(days as usize);
        Ok(bars)
    }

    async fn indicators(&self, ticker: &Ticker) -> Result<BTreeMap<String, f64>, ProviderError> {
        let symbol = ticker.to_string();
        let body = self
            .query(&[
                ("function", "RSI"),
                ("symbol", &symbol),
                ("interval", "daily"),
                ("time_period", "14"),
                ("series_type", "close"),
            ])
            .await?;
        let analysis = body
            .get("Technical Analysis: RSI")
            .and_then(Value::as_object)
            .ok_or_else(|| ProviderError::Malformed("missing RSI analysis".into()))?;

        // Latest date wins; the object is keyed by date strings.
        let value = analysis
            .iter()
            .max_by(|a, b| a.0.cmp(b.0))
            .and_then(|(_, v)| v.get("RSI"))
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| ProviderError::Malformed("no RSI values".into()))?;

        let mut indicators = BTreeMap::new();
        indicators.insert("rsi".to_string(), value);
        Ok(indicators)
    }
}
