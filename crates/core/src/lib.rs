//! Core types for the stocksense signal engine.
//!
//! Everything downstream (aggregator, agents, consensus, persistence,
//! backtesting) builds on the value types and error taxonomy defined here.

pub mod backtest;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod signal;
pub mod snapshot;
pub mod ticker;
pub mod verdict;

pub use backtest::{
    AgentAttribution, AllocationMode, BacktestMetrics, BacktestReport, BacktestRequest,
    BacktestTrade, EquityPoint, ExitReason, PositionType, TradeResult,
};
pub use config::{
    AgentWeights, AppConfig, BreakerConfig, CacheConfig, ConsensusConfig, DatabaseConfig,
    DeadlineConfig, LlmConfig, ProviderConfig, RateLimitConfig, RetryConfig, RiskConfig,
};
pub use config_loader::ConfigLoader;
pub use error::EngineError;
pub use signal::{AgentVerdict, Recommendation, SignalLevel, SignalThresholds, SignalType};
pub use snapshot::{
    DailyBar, MarketSnapshot, MarketSource, NewsSentiment, SentimentSnapshot, SocialSentiment,
    VolumeTrend,
};
pub use ticker::Ticker;
pub use verdict::{SignalStatus, Verdict};
