//! Reddit adapter for social-chatter sentiment.
//!
//! Uses the public JSON search endpoint; mention counts come from the result
//! list and sentiment from the lexicon over post titles.

use crate::error::ProviderError;
use crate::lexicon;
use crate::providers::{error_for_status, SocialProvider};
use crate::rate_limit::ProviderLimiter;
use async_trait::async_trait;
use serde::Deserialize;
use stocksense_core::{SocialSentiment, Ticker};
use tracing::debug;

/// Production API base.
pub const REDDIT_API_URL: &str = "https://www.reddit.com";

pub struct RedditProvider {
    http: reqwest::Client,
    base_url: String,
    user_agent: String,
    limiter: ProviderLimiter,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default)]
    title: String,
}

impl RedditProvider {
    #[must_use]
    pub fn new(http: reqwest::Client, user_agent: String, limiter: ProviderLimiter) -> Self {
        Self {
            http,
            base_url: REDDIT_API_URL.to_string(),
            user_agent,
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
impl SocialProvider for RedditProvider {
    async fn social(&self, ticker: &Ticker) -> Result<SocialSentiment, ProviderError> {
        self.limiter.acquire()?;
        let url = format!("{}/search.json", self.base_url);
        debug!(provider = "reddit", %url, %ticker, "GET");
        let response = self
            .http
            .get(&url)
            .query(&[
                ("q", ticker.as_str()),
                ("sort", "new"),
                ("t", "week"),
                ("limit", "50"),
            ])
            .header("User-Agent", &self.user_agent)
            .send()
            .await?;
        let response = error_for_status(response).await?;
        let listing: Listing = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let titles: Vec<&str> = listing
            .data
            .children
            .iter()
            .map(|c| c.data.title.as_str())
            .collect();

        Ok(SocialSentiment {
            mentions: titles.len() as u32,
            score: lexicon::score_texts(titles.iter().copied()),
            available: true,
        })
    }
}
