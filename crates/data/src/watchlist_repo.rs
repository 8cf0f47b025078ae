//! Watchlist maintenance.

use sqlx::PgPool;
use stocksense_core::{EngineError, Ticker};

#[derive(Debug, Clone)]
pub struct WatchlistRepository {
    pool: PgPool,
}

impl WatchlistRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Adds or reactivates a ticker.
    ///
    /// # Errors
    /// `Fatal` on database failure.
    pub async fn upsert(
        &self,
        ticker: &Ticker,
        company_name: Option<&str>,
    ) -> Result<(), EngineError> {
        sqlx::query(
            r"
            INSERT INTO watchlist (ticker, company_name, active)
            VALUES ($1, $2, TRUE)
            ON CONFLICT (ticker) DO UPDATE
                SET active = TRUE,
                    company_name = COALESCE(EXCLUDED.company_name, watchlist.company_name)
            ",
        )
        .bind(ticker.as_str())
        .bind(company_name)
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::Fatal(anyhow::Error::new(e)))?;
        Ok(())
    }

    /// Active tickers, alphabetical.
    ///
    /// # Errors
    /// `Fatal` on database failure.
    pub async fn active_tickers(&self) -> Result<Vec<Ticker>, EngineError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT ticker FROM watchlist WHERE active ORDER BY ticker")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| EngineError::Fatal(anyhow::Error::new(e)))?;
        rows.into_iter().map(|(t,)| Ticker::parse(&t)).collect()
    }

    /// Deactivates a ticker without touching its history.
    ///
    /// # Errors
    /// `BadInput` for an unknown ticker, `Fatal` on database failure.
    pub async fn deactivate(&self, ticker: &Ticker) -> Result<(), EngineError> {
        let result = sqlx::query("UPDATE watchlist SET active = FALSE WHERE ticker = $1")
            .bind(ticker.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Fatal(anyhow::Error::new(e)))?;
        if result.rows_affected() == 0 {
            return Err(EngineError::BadInput(format!(
                "{ticker} is not on the watchlist"
            )));
        }
        Ok(())
    }
}
