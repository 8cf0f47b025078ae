//! Postgres persistence for verdicts, agent analyses, backtests, and the
//! fetched-data archive.
//!
//! Repositories are constructed once at startup around a shared `PgPool`;
//! sessions are scoped per call and never shared across requests.

pub mod archive_repo;
pub mod backtest_repo;
pub mod models;
pub mod signal_repo;
pub mod watchlist_repo;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use stocksense_core::DatabaseConfig;

pub use archive_repo::ArchiveRepository;
pub use backtest_repo::BacktestRepository;
pub use signal_repo::{SignalFilter, SignalRepository, SignalStatistics};
pub use watchlist_repo::WatchlistRepository;

/// Connects a pool using the configured URL and connection cap.
///
/// # Errors
/// Returns an error if the database cannot be reached.
pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;
    Ok(pool)
}

/// Applies the schema migration file. Idempotent.
///
/// # Errors
/// Returns an error if a statement fails.
pub async fn apply_schema(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::raw_sql(include_str!("../migrations/0001_init.sql"))
        .execute(pool)
        .await?;
    Ok(())
}
