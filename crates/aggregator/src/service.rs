//! The data aggregator: one call returns the market and sentiment snapshots
//! for a ticker, degraded rather than failed when sources are down.
//!
//! Provider attempts inside a chain are sequential; the four top-level
//! operations (quote, historical, indicators, sentiment) run concurrently,
//! each under its own deadline.

use crate::breaker::BreakerRegistry;
use crate::cache::TtlCache;
use crate::error::ProviderError;
use crate::indicators;
use crate::providers::{
    AlphaVantageProvider, FinnhubProvider, MarketOperation, MarketProvider, NewsApiProvider,
    NewsProvider, PolygonProvider, Quote, RedditProvider, SocialProvider,
};
use crate::rate_limit::ProviderLimiter;
use crate::retry::RetryPolicy;
use chrono::Utc;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use stocksense_core::{
    AppConfig, BreakerConfig, CacheConfig, DailyBar, MarketSnapshot, MarketSource, NewsSentiment,
    SentimentSnapshot, SocialSentiment, Ticker,
};
use tokio::time::timeout;
use tracing::{info, warn};

/// Days of history requested for a signal snapshot.
const SNAPSHOT_HISTORY_DAYS: u32 = 30;
/// Hard cap on bars kept in a snapshot.
const MAX_HISTORY_BARS: usize = 100;

type CacheKey = (String, MarketSource);

#[derive(Debug, Clone)]
struct CachedQuote {
    quote: Quote,
    source: MarketSource,
}

#[derive(Debug, Clone)]
struct CachedBars {
    /// How many days the cached fetch asked for; a hit must have asked for
    /// at least as many as the current request.
    requested: u32,
    bars: Vec<DailyBar>,
}

/// Result of one aggregation request.
#[derive(Debug)]
pub struct AggregateOutcome {
    pub market: MarketSnapshot,
    pub sentiment: SentimentSnapshot,
    /// Human-readable notes about every degraded field.
    pub warnings: Vec<String>,
}

/// Aggregates market and sentiment data behind retry, breaker, cache, and
/// rate-limit discipline.
pub struct DataAggregator {
    providers: Vec<Arc<dyn MarketProvider>>,
    news: Option<Arc<dyn NewsProvider>>,
    social: Option<Arc<dyn SocialProvider>>,
    breakers: Arc<BreakerRegistry>,
    breaker_config: BreakerConfig,
    retry: RetryPolicy,
    quotes: TtlCache<CacheKey, CachedQuote>,
    historical_cache: TtlCache<CacheKey, CachedBars>,
    indicator_cache: TtlCache<CacheKey, BTreeMap<String, f64>>,
    sentiment_cache: TtlCache<String, SentimentSnapshot>,
    cache_config: CacheConfig,
    operation_deadline: Duration,
}

impl DataAggregator {
    /// Builds an aggregator over explicit providers. The chain is tried in
    /// the order given.
    #[must_use]
    pub fn new(
        config: &AppConfig,
        providers: Vec<Arc<dyn MarketProvider>>,
        news: Option<Arc<dyn NewsProvider>>,
        social: Option<Arc<dyn SocialProvider>>,
        breakers: Arc<BreakerRegistry>,
    ) -> Self {
        let cache_config = config.cache.clone();
        Self {
            providers,
            news,
            social,
            breakers,
            breaker_config: config.breaker.clone(),
            retry: RetryPolicy::new(&config.retry),
            quotes: TtlCache::new(cache_config.stale_factor),
            historical_cache: TtlCache::new(cache_config.stale_factor),
            indicator_cache: TtlCache::new(cache_config.stale_factor),
            sentiment_cache: TtlCache::new(cache_config.stale_factor),
            cache_config,
            operation_deadline: Duration::from_secs(config.deadlines.operation_secs),
        }
    }

    /// Builds the production chain (Polygon -> Finnhub -> Alpha Vantage) and
    /// sentiment sources from configured credentials. Providers without keys
    /// are left out of the chain.
    #[must_use]
    pub fn from_config(config: &AppConfig, breakers: Arc<BreakerRegistry>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.deadlines.operation_secs))
            .build()
            .unwrap_or_default();
        let limits = &config.providers.rate_limits;

        let mut providers: Vec<Arc<dyn MarketProvider>> = Vec::new();
        if let Some(key) = &config.providers.polygon_api_key {
            providers.push(Arc::new(PolygonProvider::new(
                http.clone(),
                key.clone(),
                ProviderLimiter::per_minute(limits.polygon_per_minute),
            )));
        }
        if let Some(key) = &config.providers.finnhub_api_key {
            providers.push(Arc::new(FinnhubProvider::new(
                http.clone(),
                key.clone(),
                ProviderLimiter::per_minute(limits.finnhub_per_minute),
            )));
        }
        if let Some(key) = &config.providers.alpha_vantage_api_key {
            providers.push(Arc::new(AlphaVantageProvider::new(
                http.clone(),
                key.clone(),
                ProviderLimiter::per_minute(limits.alpha_vantage_per_minute),
            )));
        }
        if providers.is_empty() {
            warn!("no market provider keys configured; snapshots will be empty");
        }

        let news: Option<Arc<dyn NewsProvider>> =
            config.providers.news_api_key.as_ref().map(|key| {
                Arc::new(NewsApiProvider::new(
                    http.clone(),
                    key.clone(),
                    ProviderLimiter::per_minute(limits.news_per_minute),
                )) as Arc<dyn NewsProvider>
            });
        let social: Option<Arc<dyn SocialProvider>> = Some(Arc::new(RedditProvider::new(
            http,
            config.providers.reddit_user_agent.clone(),
            ProviderLimiter::per_minute(limits.reddit_per_minute),
        )));

        Self::new(config, providers, news, social, breakers)
    }

    /// Fetches both snapshots for a ticker. Never fails: missing inputs are
    /// absent fields plus warnings.
    pub async fn fetch(&self, ticker: &Ticker) -> AggregateOutcome {
        let as_of = Utc::now();
        let deadline = self.operation_deadline;

        let (quote, historical, indicator_map, sentiment) = tokio::join!(
            timeout(deadline, self.fetch_quote(ticker)),
            timeout(deadline, self.fetch_historical(ticker, SNAPSHOT_HISTORY_DAYS)),
            timeout(deadline, self.fetch_indicators(ticker)),
            timeout(deadline, self.fetch_sentiment(ticker)),
        );

        let mut warnings = Vec::new();

        let quote = quote.unwrap_or_else(|_| {
            self.stale_fallback(MarketOperation::Quote, ticker, &self.quotes)
                .ok_or_else(|| "quote operation deadline elapsed".to_string())
        });
        let historical = historical.unwrap_or_else(|_| {
            self.stale_fallback(MarketOperation::Historical, ticker, &self.historical_cache)
                .map(|(cached, notes)| (cached.bars, notes))
                .ok_or_else(|| "historical operation deadline elapsed".to_string())
        });
        let indicator_map = indicator_map.unwrap_or_else(|_| {
            self.stale_fallback(MarketOperation::Indicators, ticker, &self.indicator_cache)
                .ok_or_else(|| "indicators operation deadline elapsed".to_string())
        });
        let sentiment = sentiment
            .unwrap_or_else(|_| Err("sentiment operation deadline elapsed".to_string()));

        let mut market = MarketSnapshot::empty(ticker.clone(), as_of);

        match quote {
            Ok((cached, mut notes)) => {
                market.current_price = Some(cached.quote.price);
                market.source_used = Some(cached.source);
                if let Some(change) = cached.quote.change_percent {
                    market
                        .indicators
                        .insert("price_change_1d".to_string(), change);
                }
                warnings.append(&mut notes);
            }
            Err(note) => warnings.push(note),
        }

        match historical {
            Ok((mut bars, mut notes)) => {
                bars.truncate(MAX_HISTORY_BARS);
                market.historical = bars;
                warnings.append(&mut notes);
            }
            Err(note) => warnings.push(note),
        }

        match indicator_map {
            Ok((map, mut notes)) => {
                for (key, value) in map {
                    market.indicators.insert(key, value);
                }
                warnings.append(&mut notes);
            }
            Err(note) => warnings.push(note),
        }

        self.derive_local_indicators(&mut market);

        let sentiment = match sentiment {
            Ok((snapshot, mut notes)) => {
                warnings.append(&mut notes);
                snapshot
            }
            Err(note) => {
                warnings.push(note);
                SentimentSnapshot::unavailable(ticker.clone(), as_of)
            }
        };

        info!(
            %ticker,
            price = ?market.current_price,
            bars = market.historical.len(),
            sentiment = sentiment.combined_sentiment,
            warnings = warnings.len(),
            "aggregated snapshot"
        );

        AggregateOutcome {
            market,
            sentiment,
            warnings,
        }
    }

    /// Public historical access for replay (backtesting). Walks the same
    /// chain and cache as snapshot assembly.
    pub async fn historical(&self, ticker: &Ticker, days: u32) -> Option<Vec<DailyBar>> {
        match timeout(self.operation_deadline, self.fetch_historical(ticker, days)).await {
            Ok(Ok((bars, _))) => Some(bars),
            Ok(Err(_)) | Err(_) => self
                .stale_fallback(MarketOperation::Historical, ticker, &self.historical_cache)
                .map(|(cached, _)| cached.bars),
        }
    }

    /// Fills indicator gaps from the historical series and computes the
    /// fields that never come from providers.
    fn derive_local_indicators(&self, market: &mut MarketSnapshot) {
        let bars = &market.historical;
        if bars.is_empty() {
            return;
        }
        if !market.indicators.contains_key("rsi") {
            if let Some(value) = indicators::rsi(bars, 14) {
                market.indicators.insert("rsi".to_string(), value);
            }
        }
        for (key, days) in [("price_change_7d", 7), ("price_change_30d", 30)] {
            if let Some(change) = indicators::price_change_pct(bars, days) {
                market.indicators.insert(key.to_string(), change);
            }
        }
        market.volume_trend = indicators::volume_trend(bars);
    }

    async fn fetch_quote(
        &self,
        ticker: &Ticker,
    ) -> Result<(CachedQuote, Vec<String>), String> {
        let op = MarketOperation::Quote;
        // Fresh cache short-circuits the network.
        for provider in &self.providers {
            let key = (ticker.to_string(), provider.source());
            if let Some(cached) = self.quotes.fresh(&key) {
                return Ok((cached, Vec::new()));
            }
        }

        let mut notes = Vec::new();
        for provider in &self.providers {
            let source = provider.source();
            match self
                .call_provider(source, op, || provider.quote(ticker))
                .await
            {
                Ok(quote) => {
                    let cached = CachedQuote { quote, source };
                    self.quotes.insert(
                        (ticker.to_string(), source),
                        cached.clone(),
                        Duration::from_secs(self.cache_config.quote_ttl_secs),
                    );
                    return Ok((cached, notes));
                }
                Err(err) => notes.push(format!("{source} quote failed: {err}")),
            }
        }

        match self.stale_fallback(op, ticker, &self.quotes) {
            Some((cached, mut stale_notes)) => {
                notes.append(&mut stale_notes);
                Ok((cached, notes))
            }
            None => Err(format!(
                "quote unavailable for {ticker}: {}",
                notes.join("; ")
            )),
        }
    }

    async fn fetch_historical(
        &self,
        ticker: &Ticker,
        days: u32,
    ) -> Result<(Vec<DailyBar>, Vec<String>), String> {
        let op = MarketOperation::Historical;
        for provider in &self.providers {
            let key = (ticker.to_string(), provider.source());
            if let Some(cached) = self.historical_cache.fresh(&key) {
                if cached.requested >= days {
                    return Ok((cached.bars, Vec::new()));
                }
            }
        }

        let mut notes = Vec::new();
        for provider in &self.providers {
            let source = provider.source();
            match self
                .call_provider(source, op, || provider.historical(ticker, days))
                .await
            {
                Ok(bars) => {
                    self.historical_cache.insert(
                        (ticker.to_string(), source),
                        CachedBars {
                            requested: days,
                            bars: bars.clone(),
                        },
                        Duration::from_secs(self.cache_config.historical_ttl_secs),
                    );
                    return Ok((bars, notes));
                }
                Err(err) => notes.push(format!("{source} historical failed: {err}")),
            }
        }

        match self.stale_fallback(op, ticker, &self.historical_cache) {
            Some((cached, mut stale_notes)) => {
                notes.append(&mut stale_notes);
                Ok((cached.bars, notes))
            }
            None => Err(format!(
                "historical data unavailable for {ticker}: {}",
                notes.join("; ")
            )),
        }
    }

    async fn fetch_indicators(
        &self,
        ticker: &Ticker,
    ) -> Result<(BTreeMap<String, f64>, Vec<String>), String> {
        let op = MarketOperation::Indicators;
        for provider in &self.providers {
            let key = (ticker.to_string(), provider.source());
            if let Some(map) = self.indicator_cache.fresh(&key) {
                return Ok((map, Vec::new()));
            }
        }

        let mut notes = Vec::new();
        for provider in &self.providers {
            let source = provider.source();
            match self
                .call_provider(source, op, || provider.indicators(ticker))
                .await
            {
                Ok(map) => {
                    self.indicator_cache.insert(
                        (ticker.to_string(), source),
                        map.clone(),
                        Duration::from_secs(self.cache_config.indicator_ttl_secs),
                    );
                    return Ok((map, notes));
                }
                Err(err) => notes.push(format!("{source} indicators failed: {err}")),
            }
        }

        match self.stale_fallback(op, ticker, &self.indicator_cache) {
            Some((map, mut stale_notes)) => {
                notes.append(&mut stale_notes);
                Ok((map, notes))
            }
            None => Err(format!(
                "indicators unavailable for {ticker}: {}",
                notes.join("; ")
            )),
        }
    }

    async fn fetch_sentiment(
        &self,
        ticker: &Ticker,
    ) -> Result<(SentimentSnapshot, Vec<String>), String> {
        if let Some(snapshot) = self.sentiment_cache.fresh(&ticker.to_string()) {
            return Ok((snapshot, Vec::new()));
        }

        let mut notes = Vec::new();

        let news = match &self.news {
            Some(provider) => {
                match self
                    .call_sentiment("newsapi", || provider.news(ticker))
                    .await
                {
                    Ok(news) => news,
                    Err(err) => {
                        notes.push(format!("news sentiment unavailable: {err}"));
                        NewsSentiment::default()
                    }
                }
            }
            None => {
                notes.push("news sentiment source not configured".to_string());
                NewsSentiment::default()
            }
        };

        let social = match &self.social {
            Some(provider) => {
                match self
                    .call_sentiment("reddit", || provider.social(ticker))
                    .await
                {
                    Ok(social) => social,
                    Err(err) => {
                        notes.push(format!("social sentiment unavailable: {err}"));
                        SocialSentiment::default()
                    }
                }
            }
            None => {
                notes.push("social sentiment source not configured".to_string());
                SocialSentiment::default()
            }
        };

        let snapshot = SentimentSnapshot::combine(ticker.clone(), Utc::now(), social, news);
        if snapshot.available {
            self.sentiment_cache.insert(
                ticker.to_string(),
                snapshot.clone(),
                Duration::from_secs(self.cache_config.sentiment_ttl_secs),
            );
            return Ok((snapshot, notes));
        }

        // Both sources down: a stale combined snapshot beats a neutral zero.
        if let Some((stale, age)) = self.sentiment_cache.stale(&ticker.to_string()) {
            notes.push(format!(
                "serving stale sentiment ({}s old)",
                age.as_secs()
            ));
            return Ok((stale, notes));
        }
        Ok((snapshot, notes))
    }

    /// One provider call behind its breaker and the retry policy. The
    /// breaker advances a single tick per exhausted call, not per attempt.
    async fn call_provider<T, F, Fut>(
        &self,
        source: MarketSource,
        op: MarketOperation,
        call: F,
    ) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let breaker = self
            .breakers
            .get(&source.to_string(), &self.breaker_config);
        if !breaker.can_execute() {
            return Err(ProviderError::BreakerOpen {
                provider: source.to_string(),
            });
        }

        let label = format!("{source}/{op}");
        let result = self.retry.run(&label, || call()).await;
        match &result {
            Ok(_) => breaker.record_success(),
            Err(ProviderError::NotConfigured { .. }) => {}
            Err(_) => breaker.record_failure(),
        }
        result
    }

    async fn call_sentiment<T, F, Fut>(&self, name: &str, call: F) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let breaker = self.breakers.get(name, &self.breaker_config);
        if !breaker.can_execute() {
            return Err(ProviderError::BreakerOpen {
                provider: name.to_string(),
            });
        }
        let result = self.retry.run(name, || call()).await;
        match &result {
            Ok(_) => breaker.record_success(),
            Err(_) => breaker.record_failure(),
        }
        result
    }

    /// Stale-cache lookup across the chain, in chain order.
    fn stale_fallback<V: Clone>(
        &self,
        op: MarketOperation,
        ticker: &Ticker,
        cache: &TtlCache<CacheKey, V>,
    ) -> Option<(V, Vec<String>)> {
        for provider in &self.providers {
            let key = (ticker.to_string(), provider.source());
            if let Some((value, age)) = cache.stale(&key) {
                let note = format!(
                    "serving stale {op} from {} ({}s old)",
                    provider.source(),
                    age.as_secs()
                );
                warn!("{note}");
                return Some((value, vec![note]));
            }
        }
        None
    }
}
