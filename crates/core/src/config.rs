//! Application configuration.
//!
//! Every tunable named in the design docs lives here with its current
//! default. Sections deserialize independently so a partial config file
//! (or none at all) still yields a working configuration.

use crate::signal::SignalThresholds;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub providers: ProviderConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub deadlines: DeadlineConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub agents: AgentWeights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/stocksense".to_string(),
            max_connections: 10,
        }
    }
}

/// Market and sentiment provider credentials and rate limits.
///
/// A missing key disables that provider; the chain simply moves on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub polygon_api_key: Option<String>,
    pub finnhub_api_key: Option<String>,
    pub alpha_vantage_api_key: Option<String>,
    pub news_api_key: Option<String>,
    #[serde(default = "default_reddit_user_agent")]
    pub reddit_user_agent: String,
    /// Requests per minute, per provider. Free-tier defaults.
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
}

fn default_reddit_user_agent() -> String {
    "stocksense/0.3".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub polygon_per_minute: u32,
    pub finnhub_per_minute: u32,
    pub alpha_vantage_per_minute: u32,
    pub news_per_minute: u32,
    pub reddit_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            polygon_per_minute: 5,
            finnhub_per_minute: 60,
            alpha_vantage_per_minute: 5,
            news_per_minute: 30,
            reddit_per_minute: 60,
        }
    }
}

/// LLM vendor credentials and model selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub google_api_key: Option<String>,
    pub gemini_model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: "gpt-4o".to_string(),
            anthropic_api_key: None,
            anthropic_model: "claude-sonnet-4-20250514".to_string(),
            google_api_key: None,
            gemini_model: "gemini-2.0-flash".to_string(),
            max_tokens: 500,
            timeout_secs: 20,
        }
    }
}

/// Retry policy for transient provider failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Base of the exponential schedule, milliseconds.
    pub base_delay_ms: u64,
    /// Uniform jitter added on top of the base, milliseconds.
    pub jitter_ms: u64,
    /// Delay ceiling, milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            jitter_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

/// Per-provider circuit breaker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures within the window that open the breaker.
    pub failure_threshold: u32,
    /// Failure-counting window, seconds.
    pub window_secs: u64,
    /// Open -> half-open cooldown, seconds.
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window_secs: 60,
            cooldown_secs: 30,
        }
    }
}

/// Cache TTLs per operation; stale entries are served up to
/// `stale_factor x TTL` after a full chain failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub quote_ttl_secs: u64,
    pub historical_ttl_secs: u64,
    pub indicator_ttl_secs: u64,
    pub sentiment_ttl_secs: u64,
    pub stale_factor: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            quote_ttl_secs: 60,
            historical_ttl_secs: 3_600,
            indicator_ttl_secs: 900,
            sentiment_ttl_secs: 1_800,
            stale_factor: 10,
        }
    }
}

/// Deadlines for the suspension points in a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlineConfig {
    /// Per top-level aggregator operation (quote, historical, indicators,
    /// sentiment).
    pub operation_secs: u64,
    /// Shared deadline for the whole agent panel.
    pub panel_secs: u64,
    /// Overall budget for one signal request; bounds the panel deadline.
    pub signal_secs: u64,
    /// Budget for a backtest run; no retry semantics.
    pub backtest_secs: u64,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            operation_secs: 10,
            panel_secs: 30,
            signal_secs: 45,
            backtest_secs: 300,
        }
    }
}

/// Consensus tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Score cut points shared with the predictor agent.
    pub thresholds: SignalThresholds,
    /// Weighted-mass equality tolerance for the tie-break.
    pub tie_epsilon: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            thresholds: SignalThresholds::default(),
            tie_epsilon: 1e-6,
        }
    }
}

/// Risk parameters and position sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Stop-loss distance from entry (fraction).
    pub stop_loss_pct: Decimal,
    /// First take-profit target distance from entry (fraction). Only this
    /// target is persisted on the verdict.
    pub target_pct: Decimal,
    /// Scale-out targets beyond the first; informational.
    pub scale_out_targets: Vec<Decimal>,
    /// Configured account capital.
    pub capital: Decimal,
    /// Maximum fraction of capital in one position.
    pub max_position_pct: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: Decimal::new(10, 2),      // 0.10
            target_pct: Decimal::new(25, 2),         // 0.25
            scale_out_targets: vec![Decimal::new(50, 2), Decimal::new(100, 2)],
            capital: Decimal::new(50_000, 0),
            max_position_pct: Decimal::new(10, 2),   // 0.10
        }
    }
}

/// Per-agent consensus weights. Immutable during a request; swapped
/// atomically between requests when a learning collaborator supplies
/// updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentWeights {
    pub contrarian: f64,
    pub growth: f64,
    pub multimodal: f64,
    pub predictor: f64,
}

impl Default for AgentWeights {
    fn default() -> Self {
        Self {
            contrarian: 1.0,
            growth: 1.0,
            multimodal: 1.0,
            predictor: 1.0,
        }
    }
}
