//! Polygon.io adapter (primary market provider).

use crate::error::ProviderError;
use crate::providers::{error_for_status, MarketProvider, Quote};
use crate::rate_limit::ProviderLimiter;
use async_trait::async_trait;
use chrono::{DateTime, Days, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use stocksense_core::{DailyBar, MarketSource, Ticker};
use tracing::debug;

/// Production API base.
pub const POLYGON_API_URL: &str = "https://api.polygon.io";

pub struct PolygonProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    limiter: ProviderLimiter,
}

#[derive(Debug, Deserialize)]
struct AggsResponse {
    #[serde(default)]
    results: Vec<AggBar>,
}

#[derive(Debug, Deserialize)]
struct AggBar {
    /// Epoch millis of the bar start.
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

#[derive(Debug, Deserialize)]
struct RsiResponse {
    results: Option<RsiResults>,
}

#[derive(Debug, Deserialize)]
struct RsiResults {
    #[serde(default)]
    values: Vec<RsiValue>,
}

#[derive(Debug, Deserialize)]
struct RsiValue {
    value: f64,
}

impl PolygonProvider {
    #[must_use]
    pub fn new(http: reqwest::Client, api_key: String, limiter: ProviderLimiter) -> Self {
        Self {
            http,
            base_url: POLYGON_API_URL.to_string(),
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

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        self.limiter.acquire()?;
        let url = format!("{}{}", self.base_url, path);
        debug!(provider = "polygon", %url, "GET");
        let response = self
            .http
            .get(&url)
            .query(query)
            .query(&[("apiKey", self.api_key.as_str())])
            .send()
            .await?;
        let response = error_for_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }

    fn bar_from_agg(agg: &AggBar) -> Option<DailyBar> {
        let date = DateTime::<Utc>::from_timestamp_millis(agg.t)?.date_naive();
        Some(DailyBar {
            date,
            open: Decimal::from_f64(agg.o)?,
            high: Decimal::from_f64(agg.h)?,
            low: Decimal::from_f64(agg.l)?,
            close: Decimal::from_f64(agg.c)?,
            volume: agg.v as i64,
        })
    }
}

#[async_trait]
impl MarketProvider for PolygonProvider {
    fn source(&self) -> MarketSource {
        MarketSource::Polygon
    }

    async fn quote(&self, ticker: &Ticker) -> Result<Quote, ProviderError> {
        let path = format!("/v2/aggs/ticker/{ticker}/prev");
        let body: AggsResponse = self.get_json(&path, &[("adjusted", "true")]).await?;
        let bar = body
            .results
            .first()
            .ok_or_else(|| ProviderError::Malformed("empty results".into()))?;
        let price = Decimal::from_f64(bar.c)
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| ProviderError::Malformed(format!("bad close {}", bar.c)))?;
        let change_percent = if bar.o > 0.0 {
            Some((bar.c - bar.o) / bar.o * 100.0)
        } else {
            None
        };
        Ok(Quote {
            price,
            change_percent,
        })
    }

    async fn historical(&self, ticker: &Ticker, days: u32) -> Result<Vec<DailyBar>, ProviderError> {
        let end = Utc::now().date_naive();
        // Extra calendar days to cover weekends and holidays.
        let start = end
            .checked_sub_days(Days::new(u64::from(days) + 10))
            .unwrap_or(end);
        let path = format!("/v2/aggs/ticker/{ticker}/range/1/day/{start}/{end}");
        let body: AggsResponse = self
            .get_json(&path, &[("adjusted", "true"), ("sort", "desc")])
            .await?;

        let bars: Vec<DailyBar> = body
            .results
            .iter()
            .filter_map(Self::bar_from_agg)
            .take(days as usize)
            .collect();
        if bars.is_empty() {
            return Err(ProviderError::Malformed("no bars returned".into()));
        }
        Ok(bars)
    }

    async fn indicators(&self, ticker: &Ticker) -> Result<BTreeMap<String, f64>, ProviderError> {
        let path = format!("/v1/indicators/rsi/{ticker}");
        let body: RsiResponse = self
            .get_json(
                &path,
                &[
                    ("timespan", "day"),
                    ("window", "14"),
                    ("series_type", "close"),
                    ("limit", "1"),
                ],
            )
            .await?;

        let value = body
            .results
            .and_then(|r| r.values.first().map(|v| v.value))
            .ok_or_else(|| ProviderError::Malformed("no RSI values".into()))?;

        let mut indicators = BTreeMap::new();
        indicators.insert("rsi".to_string(), value);
        Ok(indicators)
    }
}
