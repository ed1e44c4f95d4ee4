//! Postgres-backed rate store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{error, info, instrument};

use ratekeeper_common::{
    CurrencyCode, MergeSummary, Rate, RatekeeperError, Result, Snapshot,
};

use crate::store::RateStore;

const CREATE_RATES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS rates (
    id SERIAL PRIMARY KEY,
    code VARCHAR(3) NOT NULL UNIQUE,
    value NUMERIC(18, 6) NOT NULL CHECK (value > 0),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

// `xmax = 0` holds only for a freshly inserted tuple.
const UPSERT_RATE: &str = r#"
INSERT INTO rates (code, value, updated_at)
VALUES ($1, $2, $3)
ON CONFLICT (code) DO UPDATE
SET value = EXCLUDED.value,
    updated_at = GREATEST(rates.updated_at, EXCLUDED.updated_at)
RETURNING (xmax = 0) AS inserted
"#;

#[derive(Debug, sqlx::FromRow)]
struct RateRow {
    code: String,
    value: Decimal,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RateRow> for Rate {
    type Error = RatekeeperError;

    fn try_from(row: RateRow) -> Result<Self> {
        let code = CurrencyCode::parse(row.code.trim())
            .map_err(|e| RatekeeperError::StorageError(e.to_string()))?;
        Ok(Rate::new(code, row.value, row.updated_at))
    }
}

fn storage_error(e: sqlx::Error) -> RatekeeperError {
    RatekeeperError::StorageError(e.to_string())
}

/// Rate store on a Postgres `rates` table.
pub struct PgRateStore {
    pool: PgPool,
}

impl PgRateStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(storage_error)?;
        Ok(Self::new(pool))
    }

    /// Create the `rates` table if it does not exist.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(CREATE_RATES_TABLE)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        info!("Rates table ready");
        Ok(())
    }
}

#[async_trait]
impl RateStore for PgRateStore {
    async fn latest_update(&self) -> Result<Option<DateTime<Utc>>> {
        sqlx::query_scalar::<_, Option<DateTime<Utc>>>("SELECT MAX(updated_at) FROM rates")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)
    }

    #[instrument(skip(self, snapshot), fields(currencies = snapshot.len()))]
    async fn merge_snapshot(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> Result<MergeSummary> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let mut summary = MergeSummary::default();

        for (code, value) in &snapshot.rates {
            let inserted = sqlx::query_scalar::<_, bool>(UPSERT_RATE)
                .bind(code.code())
                .bind(*value)
                .bind(now)
                .fetch_one(&mut *tx)
                .await;

            match inserted {
                Ok(true) => summary.inserted += 1,
                Ok(false) => summary.updated += 1,
                Err(e) => {
                    error!(currency = %code, error = %e, "Rate upsert failed, rolling back");
                    tx.rollback().await.map_err(storage_error)?;
                    return Err(storage_error(e));
                }
            }
        }

        tx.commit().await.map_err(storage_error)?;
        info!(
            updated = summary.updated,
            inserted = summary.inserted,
            "Database transaction committed"
        );
        Ok(summary)
    }

    async fn all_rates(&self) -> Result<Vec<Rate>> {
        let rows = sqlx::query_as::<_, RateRow>(
            "SELECT code, value, updated_at FROM rates ORDER BY code",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(Rate::try_from).collect()
    }

    async fn get_rate(&self, code: &CurrencyCode) -> Result<Option<Rate>> {
        let row = sqlx::query_as::<_, RateRow>(
            "SELECT code, value, updated_at FROM rates WHERE code = $1",
        )
        .bind(code.code())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(Rate::try_from).transpose()
    }
}
