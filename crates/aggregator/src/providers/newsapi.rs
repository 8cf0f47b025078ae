//! NewsAPI adapter for news-coverage sentiment.

use crate::error::ProviderError;
use crate::lexicon;
use crate::providers::{error_for_status, NewsProvider};
use crate::rate_limit::ProviderLimiter;
use async_trait::async_trait;
use serde::Deserialize;
use stocksense_core::{NewsSentiment, Ticker};
use tracing::debug;

/// Production API base.
pub const NEWSAPI_URL: &str = "https://newsapi.org";

/// Headlines kept on the snapshot for the multi-modal prompt.
const HEADLINE_LIMIT: usize = 5;

pub struct NewsApiProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    limiter: ProviderLimiter,
}

#[derive(Debug, Deserialize)]
struct EverythingResponse {
    status: String,
    #[serde(default, rename = "totalResults")]
    total_results: u32,
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    title: Option<String>,
}

impl NewsApiProvider {
    #[must_use]
    pub fn new(http: reqwest::Client, api_key: String, limiter: ProviderLimiter) -> Self {
        Self {
            http,
            base_url: NEWSAPI_URL.to_string(),
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
}

#[async_trait]
impl NewsProvider for NewsApiProvider {
    async fn news(&self, ticker: &Ticker) -> Result<NewsSentiment, ProviderError> {
        self.limiter.acquire()?;
        let url = format!("{}/v2/everything", self.base_url);
        debug!(provider = "newsapi", %url, %ticker, "GET");
        let response = self
            .http
            .get(&url)
            .query(&[
                ("q", ticker.as_str()),
                ("language", "en"),
                ("sortBy", "publishedAt"),
                ("pageSize", "20"),
            ])
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;
        let response = error_for_status(response).await?;
        let body: EverythingResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        if body.status != "ok" {
            return Err(ProviderError::Malformed(format!("status {}", body.status)));
        }

        let titles: Vec<String> = body
            .articles
            .into_iter()
            .filter_map(|a| a.title)
            .collect();
        let score = lexicon::score_texts(titles.iter().map(String::as_str));

        Ok(NewsSentiment {
            article_count: body.total_results.max(titles.len() as u32),
            score,
            available: true,
            headlines: titles.into_iter().take(HEADLINE_LIMIT).collect(),
        })
    }
}
