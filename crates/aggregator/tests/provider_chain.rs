//! Provider chain behavior against a mock HTTP server: rate-limit fallback,
//! breaker accounting, full-chain failure, and cache short-circuiting.

use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use stocksense_aggregator::providers::{FinnhubProvider, MarketProvider, PolygonProvider};
use stocksense_aggregator::rate_limit::ProviderLimiter;
use stocksense_aggregator::{BreakerRegistry, DataAggregator};
use stocksense_core::{AppConfig, MarketSource, RetryConfig, Ticker};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.retry = RetryConfig {
        max_attempts: 3,
        base_delay_ms: 2,
        jitter_ms: 0,
        max_delay_ms: 8,
    };
    config.deadlines.operation_secs = 5;
    config
}

fn chain_against(
    server_uri: &str,
    config: &AppConfig,
    registry: &Arc<BreakerRegistry>,
) -> DataAggregator {
    let http = reqwest::Client::new();
    let polygon = PolygonProvider::new(
        http.clone(),
        "test-key".into(),
        ProviderLimiter::per_minute(600),
    )
    .with_base_url(server_uri);
    let finnhub = FinnhubProvider::new(
        http,
        "test-key".into(),
        ProviderLimiter::per_minute(600),
    )
    .with_base_url(server_uri);

    let providers: Vec<Arc<dyn MarketProvider>> = vec![Arc::new(polygon), Arc::new(finnhub)];
    DataAggregator::new(config, providers, None, None, Arc::clone(registry))
}

fn finnhub_quote_body() -> serde_json::Value {
    json!({"c": 180.50, "pc": 178.00, "h": 181.0, "l": 177.5, "o": 178.2})
}

fn finnhub_candle_body() -> serde_json::Value {
    json!({
        "s": "ok",
        "t": [1717977600, 1718064000, 1718150400],
        "o": [175.0, 176.5, 178.0],
        "h": [176.0, 178.0, 181.0],
        "l": [174.0, 176.0, 177.5],
        "c": [175.5, 177.8, 180.5],
        "v": [900000.0, 1100000.0, 1500000.0]
    })
}

#[tokio::test]
async fn rate_limited_primary_falls_back_to_secondary() {
    let server = MockServer::start().await;

    // Primary returns 429 for the quote; retried three times, then the chain
    // moves on.
    Mock::given(method("GET"))
        .and(path("/v2/aggs/ticker/NVDA/prev"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;
    // Primary historical/indicators 404 (unmatched), secondary serves all ops.
    Mock::given(method("GET"))
        .and(path("/quote"))
        .respond_with(ResponseTemplate::new(200).set_body_json(finnhub_quote_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/stock/candle"))
        .respond_with(ResponseTemplate::new(200).set_body_json(finnhub_candle_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indicator"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"s": "ok", "rsi": [48.0, 55.0]})),
        )
        .mount(&server)
        .await;

    let config = fast_config();
    let registry = Arc::new(BreakerRegistry::new());
    let aggregator = chain_against(&server.uri(), &config, &registry);

    let ticker = Ticker::parse("NVDA").unwrap();
    let outcome = aggregator.fetch(&ticker).await;

    assert_eq!(outcome.market.current_price, Some(dec!(180.50)));
    assert_eq!(outcome.market.source_used, Some(MarketSource::Finnhub));
    assert_eq!(outcome.market.indicators.get("rsi"), Some(&55.0));
    assert_eq!(outcome.market.historical.len(), 3);
    // Newest bar first.
    assert_eq!(outcome.market.historical[0].close, dec!(180.5));
    assert!(!outcome.warnings.is_empty());

    // One breaker tick per exhausted polygon call (quote, historical,
    // indicators), well short of the opening threshold.
    let breaker = registry.get("polygon", &config.breaker);
    assert_eq!(breaker.failure_count(), 3);
    assert!(!breaker.is_open());
}

#[tokio::test]
async fn single_operation_exhaustion_ticks_breaker_once() {
    let server = MockServer::start().await;

    // Secondary serves candles; everything else (the primary) is 429.
    Mock::given(method("GET"))
        .and(path("/stock/candle"))
        .respond_with(ResponseTemplate::new(200).set_body_json(finnhub_candle_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let config = fast_config();
    let registry = Arc::new(BreakerRegistry::new());
    let aggregator = chain_against(&server.uri(), &config, &registry);

    let ticker = Ticker::parse("AAPL").unwrap();
    let bars = aggregator.historical(&ticker, 3).await;

    assert!(bars.is_some());
    let breaker = registry.get("polygon", &config.breaker);
    assert_eq!(breaker.failure_count(), 1);
}

#[tokio::test]
async fn full_chain_failure_yields_degraded_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = fast_config();
    let registry = Arc::new(BreakerRegistry::new());
    let aggregator = chain_against(&server.uri(), &config, &registry);

    let ticker = Ticker::parse("TSLA").unwrap();
    let outcome = aggregator.fetch(&ticker).await;

    assert!(outcome.market.current_price.is_none());
    assert!(outcome.market.historical.is_empty());
    assert!(outcome.market.rsi().is_none());
    assert!(!outcome.sentiment.available);
    assert_eq!(outcome.sentiment.combined_sentiment, 0.0);
    // Every degraded field left a note.
    assert!(outcome.warnings.len() >= 3);
}

#[tokio::test]
async fn fresh_cache_hit_skips_the_network() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/aggs/ticker/MSFT/prev"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"t": 1718150400000i64, "o": 420.0, "h": 430.0, "l": 419.0, "c": 425.0, "v": 1000000.0}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/indicators/rsi/MSFT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": {"values": [{"timestamp": 1718150400000i64, "value": 61.2}]}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"t": 1718150400000i64, "o": 420.0, "h": 430.0, "l": 419.0, "c": 425.0, "v": 1000000.0},
                {"t": 1718064000000i64, "o": 415.0, "h": 421.0, "l": 414.0, "c": 420.0, "v": 900000.0}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = fast_config();
    let registry = Arc::new(BreakerRegistry::new());
    let http = reqwest::Client::new();
    let polygon = PolygonProvider::new(http, "key".into(), ProviderLimiter::per_minute(600))
        .with_base_url(server.uri());
    let providers: Vec<Arc<dyn MarketProvider>> = vec![Arc::new(polygon)];
    let aggregator = DataAggregator::new(&config, providers, None, None, registry);

    let ticker = Ticker::parse("MSFT").unwrap();
    let first = aggregator.fetch(&ticker).await;
    assert_eq!(first.market.current_price, Some(dec!(425.0)));

    // Second fetch inside every TTL: served from cache, mock expectations
    // of one request each would fail otherwise.
    let second = aggregator.fetch(&ticker).await;
    assert_eq!(second.market.current_price, Some(dec!(425.0)));
    assert_eq!(second.market.source_used, Some(MarketSource::Polygon));
}
