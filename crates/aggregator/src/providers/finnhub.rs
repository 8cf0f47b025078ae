//! Finnhub adapter (secondary market provider).

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
pub const FINNHUB_API_URL: &str = "https://finnhub.io/api/v1";

pub struct FinnhubProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    limiter: ProviderLimiter,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// Current price; zero for unknown symbols.
    c: f64,
    /// Previous close.
    #[serde(default)]
    pc: f64,
}

#[derive(Debug, Deserialize)]
struct CandleResponse {
    s: String,
    #[serde(default)]
    t: Vec<i64>,
    #[serde(default)]
    o: Vec<f64>,
    #[serde(default)]
    h: Vec<f64>,
    #[serde(default)]
    l: Vec<f64>,
    #[serde(default)]
    c: Vec<f64>,
    #[serde(default)]
    v: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct IndicatorResponse {
    s: String,
    #[serde(default)]
    rsi: Vec<f64>,
}

impl FinnhubProvider {
    #[must_use]
    pub fn new(http: reqwest::Client, api_key: String, limiter: ProviderLimiter) -> Self {
        Self {
            http,
            base_url: FINNHUB_API_URL.to_string(),
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
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        self.limiter.acquire()?;
        let url = format!("{}{}", self.base_url, path);
        debug!(provider = "finnhub", %url, "GET");
        let response = self
            .http
            .get(&url)
            .query(query)
            .query(&[("token", self.api_key.as_str())])
            .send()
            .await?;
        let response = error_for_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }

    fn candle_window(days: u32) -> (i64, i64) {
        let to = Utc::now();
        let from = to
            .date_naive()
            .checked_sub_days(Days::new(u64::from(days) + 10))
            .map_or(to, |d| {
                DateTime::from_naive_utc_and_offset(d.and_time(chrono::NaiveTime::MIN), Utc)
            });
        (from.timestamp(), to.timestamp())
    }
}

#[async_trait]
impl MarketProvider for FinnhubProvider {
    fn source(&self) -> MarketSource {
        MarketSource::Finnhub
    }

    async fn quote(&self, ticker: &Ticker) -> Result<Quote, ProviderError> {
        let body: QuoteResponse = self
            .get_json("/quote", &[("symbol", ticker.to_string())])
            .await?;
        let price = Decimal::from_f64(body.c)
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| ProviderError::Malformed(format!("bad price {}", body.c)))?;
        let change_percent = if body.pc > 0.0 {
            Some((body.c - body.pc) / body.pc * 100.0)
        } else {
            None
        };
        Ok(Quote {
            price,
            change_percent,
        })
    }

    async fn historical(&self, ticker: &Ticker, days: u32) -> Result<Vec<DailyBar>, ProviderError> {
        let (from, to) = Self::candle_window(days);
        let body: CandleResponse = self
            .get_json(
                "/stock/candle",
                &[
                    ("symbol", ticker.to_string()),
                    ("resolution", "D".to_string()),
                    ("from", from.to_string()),
                    ("to", to.to_string()),
                ],
            )
            .await?;

        if body.s != "ok" {
            return Err(ProviderError::Malformed(format!("status {}", body.s)));
        }

        let len = body.t.len();
        if body.o.len() != len || body.h.len() != len || body.l.len() != len || body.c.len() != len
        {
            return Err(ProviderError::Malformed("ragged candle arrays".into()));
        }

        // Finnhub returns oldest first; we want newest first.
        let mut bars = Vec::with_capacity(len);
        for i in (0..len).rev() {
            let date = DateTime::<Utc>::from_timestamp(body.t[i], 0)
                .ok_or_else(|| ProviderError::Malformed(format!("bad timestamp {}", body.t[i])))?
                .date_naive();
            let bar = DailyBar {
                date,
                open: Decimal::from_f64(body.o[i]).unwrap_or_default(),
                high: Decimal::from_f64(body.h[i]).unwrap_or_default(),
                low: Decimal::from_f64(body.l[i]).unwrap_or_default(),
                close: Decimal::from_f64(body.c[i]).unwrap_or_default(),
                volume: body.v.get(i).copied().unwrap_or(0.0) as i64,
            };
            bars.push(bar);
            if bars.len() == days as usize {
                break;
            }
        }
        if bars.is_empty() {
            return Err(ProviderError::Malformed("no candles returned".into()));
        }
        Ok(bars)
    }

    async fn indicators(&self, ticker: &Ticker) -> Result<BTreeMap<String, f64>, ProviderError> {
        let (from, to) = Self::candle_window(30);
        let body: IndicatorResponse = self
            .get_json(
                "/indicator",
                &[
                    ("symbol", ticker.to_string()),
                    ("resolution", "D".to_string()),
                    ("indicator", "rsi".to_string()),
                    ("timeperiod", "14".to_string()),
                    ("from", from.to_string()),
                    ("to", to.to_string()),
                ],
            )
            .await?;

        if body.s != "ok" {
            return Err(ProviderError::Malformed(format!("status {}", body.s)));
        }
        let value = body
            .rsi
            .last()
            .copied()
            .ok_or_else(|| ProviderError::Malformed("no RSI values".into()))?;

        let mut indicators = BTreeMap::new();
        indicators.insert("rsi".to_string(), value);
        Ok(indicators)
    }
}
