//! Best-effort archival of fetched market and sentiment data.
//!
//! Archival failures are the caller's to log and swallow; a broken archive
//! must never fail a signal request.

use sqlx::PgPool;
use stocksense_core::{DailyBar, MarketSource, SentimentSnapshot, Ticker};

/// Most recent bars archived per fetch.
const ARCHIVE_BAR_LIMIT: usize = 10;

#[derive(Debug, Clone)]
pub struct ArchiveRepository {
    pool: PgPool,
}

impl ArchiveRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Archives the newest bars of a historical fetch. Duplicate
    /// (ticker, date, source) rows are skipped.
    ///
    /// # Errors
    /// Returns the database error for the caller to log.
    pub async fn archive_market(
        &self,
        ticker: &Ticker,
        source: MarketSource,
        bars: &[DailyBar],
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for bar in bars.iter().take(ARCHIVE_BAR_LIMIT) {
            sqlx::query(
                r"
                INSERT INTO market_data (ticker, bar_date, open, high, low, close, volume, source)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (ticker, bar_date, source) DO NOTHING
                ",
            )
            .bind(ticker.as_str())
            .bind(bar.date)
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume)
            .bind(source.to_string())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Archives one sentiment snapshot, one row per available source.
    ///
    /// # Errors
    /// Returns the database error for the caller to log.
    pub async fn archive_sentiment(&self, snapshot: &SentimentSnapshot) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        if snapshot.reddit.available {
            sqlx::query(
                r"
                INSERT INTO sentiment_data (ticker, source, sentiment_score, mention_count, raw_data)
                VALUES ($1, 'reddit', $2, $3, $4)
                ",
            )
            .bind(snapshot.ticker.as_str())
            .bind(snapshot.reddit.score)
            .bind(snapshot.reddit.mentions as i32)
            .bind(serde_json::to_value(&snapshot.reddit)?)
            .execute(&mut *tx)
            .await?;
        }
        if snapshot.news.available {
            sqlx::query(
                r"
                INSERT INTO sentiment_data (ticker, source, sentiment_score, mention_count, raw_data)
                VALUES ($1, 'news', $2, $3, $4)
                ",
            )
            .bind(snapshot.ticker.as_str())
            .bind(snapshot.news.score)
            .bind(snapshot.news.article_count as i32)
            .bind(serde_json::to_value(&snapshot.news)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
