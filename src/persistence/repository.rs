//! Database Repository
//!
//! Data access layer for trades, pending retries, exchange rates, dismissed
//! filters, settings and daily prices. Each repository also implements the matching
//! domain store trait.

use super::models::*;
use super::{DatabaseError, DbPool};
use crate::domain::entities::trade::{PendingRetry, Trade};
use crate::domain::errors::{ConfigSourceError, StoreError};
use crate::domain::repositories::{
    CachedRate, CommissionConfigSource, CommissionSettings, DismissedFilterStore, PriceHistory,
    PricePoint, RateStore, TradeStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error};

pub const TRANSACTION_COST_FIXED_KEY: &str = "transaction_cost_fixed";
pub const TRANSACTION_COST_PERCENT_KEY: &str = "transaction_cost_percent";

const TRADE_COLUMNS: &str =
    "id, symbol, side, quantity, price, currency, source, mode, executed_at, order_id";

/// Trade and pending retry repository
pub struct TradeRepository {
    pool: DbPool,
}

impl TradeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Record an executed trade
    pub async fn create(&self, trade: &Trade) -> Result<TradeRecord, DatabaseError> {
        let record = sqlx::query_as::<_, TradeRecord>(&format!(
            r#"
            INSERT INTO trades (
                symbol, side, quantity, price, currency, source, mode, executed_at, order_id
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            RETURNING {}
            "#,
            TRADE_COLUMNS
        ))
        .bind(&trade.symbol)
        .bind(trade.side.as_str())
        .bind(trade.quantity)
        .bind(trade.price)
        .bind(&trade.currency)
        .bind(&trade.source)
        .bind(&trade.mode)
        .bind(trade.executed_at)
        .bind(&trade.order_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create trade: {}", e);
            DatabaseError::QueryError(format!("Failed to create trade: {}", e))
        })?;

        debug!(
            "Created trade: {} {} {} @ {}",
            record.side, record.quantity, record.symbol, record.price
        );
        Ok(record)
    }

    /// Get recent trades, newest first
    pub async fn get_recent(&self, limit: i64) -> Result<Vec<TradeRecord>, DatabaseError> {
        let records = sqlx::query_as::<_, TradeRecord>(&format!(
            "SELECT {} FROM trades ORDER BY executed_at DESC, id DESC LIMIT ?1",
            TRADE_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get recent trades: {}", e);
            DatabaseError::QueryError(format!("Failed to get recent trades: {}", e))
        })?;

        Ok(records)
    }

    /// Get trades by symbol, newest first
    pub async fn get_by_symbol(&self, symbol: &str) -> Result<Vec<TradeRecord>, DatabaseError> {
        let records = sqlx::query_as::<_, TradeRecord>(&format!(
            "SELECT {} FROM trades WHERE symbol = ?1 ORDER BY executed_at DESC, id DESC",
            TRADE_COLUMNS
        ))
        .bind(symbol)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get trades for {}: {}", symbol, e);
            DatabaseError::QueryError(format!("Failed to get trades: {}", e))
        })?;

        Ok(records)
    }

    /// Queue a trade rejected for a market-hours reason
    pub async fn create_retry(&self, retry: &PendingRetry) -> Result<PendingRetryRecord, DatabaseError> {
        let now = Utc::now();
        let record = sqlx::query_as::<_, PendingRetryRecord>(
            r#"
            INSERT INTO pending_retries (
                symbol, side, quantity, estimated_price, currency, reason,
                failure_reason, attempts, max_attempts, status, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, 'pending', ?9, ?9)
            RETURNING *
            "#,
        )
        .bind(&retry.symbol)
        .bind(retry.side.as_str())
        .bind(retry.quantity)
        .bind(retry.estimated_price)
        .bind(&retry.currency)
        .bind(&retry.reason)
        .bind(&retry.failure_reason)
        .bind(i64::from(retry.max_attempts))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create pending retry: {}", e);
            DatabaseError::QueryError(format!("Failed to create pending retry: {}", e))
        })?;

        debug!("Created pending retry {} for {}", record.id, record.symbol);
        Ok(record)
    }

    /// Retries still eligible for resubmission, oldest first
    pub async fn get_pending_retries(&self) -> Result<Vec<PendingRetryRecord>, DatabaseError> {
        let records = sqlx::query_as::<_, PendingRetryRecord>(
            "SELECT * FROM pending_retries WHERE status = 'pending' AND attempts < max_attempts ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get pending retries: {}", e);
            DatabaseError::QueryError(format!("Failed to get pending retries: {}", e))
        })?;

        Ok(records)
    }

    pub async fn update_retry_status(&self, id: i64, status: RetryStatus) -> Result<(), DatabaseError> {
        let rows_affected = sqlx::query(
            "UPDATE pending_retries SET status = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to update pending retry {}: {}", id, e);
            DatabaseError::QueryError(format!("Failed to update pending retry: {}", e))
        })?
        .rows_affected();

        if rows_affected == 0 {
            return Err(DatabaseError::QueryError(format!(
                "Pending retry not found: {}",
                id
            )));
        }

        debug!("Updated pending retry {} to {}", id, status.as_str());
        Ok(())
    }

    /// Count one more attempt. A retry that reaches its limit is marked failed.
    pub async fn increment_retry_attempt(&self, id: i64) -> Result<(), DatabaseError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE pending_retries
            SET attempts = attempts + 1,
                status = CASE WHEN attempts + 1 >= max_attempts THEN 'failed' ELSE status END,
                updated_at = ?1
            WHERE id = ?2
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to increment attempts for pending retry {}: {}", id, e);
            DatabaseError::QueryError(format!("Failed to increment retry attempt: {}", e))
        })?
        .rows_affected();

        if rows_affected == 0 {
            return Err(DatabaseError::QueryError(format!(
                "Pending retry not found: {}",
                id
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl TradeStore for TradeRepository {
    async fn create_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        self.create(trade).await?;
        Ok(())
    }

    async fn create_pending_retry(&self, retry: &PendingRetry) -> Result<(), StoreError> {
        self.create_retry(retry).await?;
        Ok(())
    }
}

/// Exchange rate repository
pub struct ExchangeRateRepository {
    pool: DbPool,
}

impl ExchangeRateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, rate: &CachedRate) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO exchange_rates (from_currency, to_currency, rate, source, fetched_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&rate.from_currency)
        .bind(&rate.to_currency)
        .bind(rate.rate)
        .bind(&rate.source)
        .bind(rate.fetched_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Failed to save rate {}/{}: {}",
                rate.from_currency, rate.to_currency, e
            );
            DatabaseError::QueryError(format!("Failed to save exchange rate: {}", e))
        })?;

        debug!(
            "Saved rate {}/{} = {} from {}",
            rate.from_currency, rate.to_currency, rate.rate, rate.source
        );
        Ok(())
    }

    /// Newest stored rate for the pair
    pub async fn latest(&self, from: &str, to: &str) -> Result<Option<ExchangeRateRecord>, DatabaseError> {
        let record = sqlx::query_as::<_, ExchangeRateRecord>(
            r#"
            SELECT * FROM exchange_rates
            WHERE from_currency = ?1 AND to_currency = ?2
            ORDER BY fetched_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get rate {}/{}: {}", from, to, e);
            DatabaseError::QueryError(format!("Failed to get exchange rate: {}", e))
        })?;

        Ok(record)
    }
}

#[async_trait]
impl RateStore for ExchangeRateRepository {
    async fn save_rate(&self, rate: &CachedRate) -> Result<(), StoreError> {
        Ok(self.save(rate).await?)
    }

    async fn latest_rate(&self, from: &str, to: &str) -> Result<Option<CachedRate>, StoreError> {
        Ok(self.latest(from, to).await?.map(CachedRate::from))
    }
}

/// Dismissed advisory filter repository
pub struct DismissedFilterRepository {
    pool: DbPool,
}

impl DismissedFilterRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Dismiss a filter for a security. Dismissing twice is a no-op.
    pub async fn dismiss(&self, isin: &str, filter_name: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT OR IGNORE INTO dismissed_filters (isin, filter_name, dismissed_at) VALUES (?1, ?2, ?3)",
        )
        .bind(isin)
        .bind(filter_name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to dismiss filter {} for {}: {}", filter_name, isin, e);
            DatabaseError::QueryError(format!("Failed to dismiss filter: {}", e))
        })?;

        Ok(())
    }

    pub async fn get_for_security(&self, isin: &str) -> Result<Vec<DismissedFilterRecord>, DatabaseError> {
        let records = sqlx::query_as::<_, DismissedFilterRecord>(
            "SELECT * FROM dismissed_filters WHERE isin = ?1 ORDER BY filter_name",
        )
        .bind(isin)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get dismissed filters for {}: {}", isin, e);
            DatabaseError::QueryError(format!("Failed to get dismissed filters: {}", e))
        })?;

        Ok(records)
    }

    pub async fn clear(&self, isin: &str) -> Result<u64, DatabaseError> {
        let rows_affected = sqlx::query("DELETE FROM dismissed_filters WHERE isin = ?1")
            .bind(isin)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to clear dismissed filters for {}: {}", isin, e);
                DatabaseError::QueryError(format!("Failed to clear dismissed filters: {}", e))
            })?
            .rows_affected();

        debug!("Cleared {} dismissed filters for {}", rows_affected, isin);
        Ok(rows_affected)
    }
}

#[async_trait]
impl DismissedFilterStore for DismissedFilterRepository {
    async fn clear_for_security(&self, isin: &str) -> Result<u64, StoreError> {
        Ok(self.clear(isin).await?)
    }
}

/// Key/value settings repository
///
/// Commission settings stored here override the defaults it was built with.
pub struct SettingsRepository {
    pool: DbPool,
    defaults: CommissionSettings,
}

impl SettingsRepository {
    pub fn new(pool: DbPool, defaults: CommissionSettings) -> Self {
        Self { pool, defaults }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let value: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to read setting {}: {}", key, e);
                DatabaseError::QueryError(format!("Failed to read setting: {}", e))
            })?;

        Ok(value.map(|(v,)| v))
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to write setting {}: {}", key, e);
            DatabaseError::QueryError(format!("Failed to write setting: {}", e))
        })?;

        debug!("Setting {} = {}", key, value);
        Ok(())
    }

    async fn get_f64(&self, key: &str, default: f64) -> Result<f64, ConfigSourceError> {
        let value = self
            .get(key)
            .await
            .map_err(|e| ConfigSourceError::Unavailable(e.to_string()))?;

        match value {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<f64>().map_err(|_| ConfigSourceError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
        }
    }
}

#[async_trait]
impl CommissionConfigSource for SettingsRepository {
    async fn get_default_config(&self) -> Result<CommissionSettings, ConfigSourceError> {
        Ok(CommissionSettings {
            fixed: self
                .get_f64(TRANSACTION_COST_FIXED_KEY, self.defaults.fixed)
                .await?,
            percent: self
                .get_f64(TRANSACTION_COST_PERCENT_KEY, self.defaults.percent)
                .await?,
        })
    }
}

/// Daily price repository, one row per security and day
pub struct PriceHistoryRepository {
    pool: DbPool,
}

impl PriceHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert or replace the price of `isin` for the day of `at`
    pub async fn upsert(&self, isin: &str, price: f64, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        let date = at.format("%Y-%m-%d").to_string();

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO daily_prices (isin, date, price, recorded_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(isin)
        .bind(&date)
        .bind(price)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to store price for {}: {}", isin, e);
            DatabaseError::QueryError(format!("Failed to store daily price: {}", e))
        })?;

        debug!("Stored price {} for {} on {}", price, isin, date);
        Ok(())
    }

    pub async fn latest(&self, isin: &str) -> Result<Option<DailyPriceRecord>, DatabaseError> {
        let record = sqlx::query_as::<_, DailyPriceRecord>(
            r#"
            SELECT * FROM daily_prices
            WHERE isin = ?1
            ORDER BY recorded_at DESC
            LIMIT 1
            "#,
        )
        .bind(isin)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get latest price for {}: {}", isin, e);
            DatabaseError::QueryError(format!("Failed to get daily price: {}", e))
        })?;

        Ok(record)
    }
}

#[async_trait]
impl PriceHistory for PriceHistoryRepository {
    async fn latest_price(&self, isin: &str) -> Result<Option<PricePoint>, StoreError> {
        Ok(self.latest(isin).await?.map(PricePoint::from))
    }

    async fn record_price(&self, isin: &str, price: f64, at: DateTime<Utc>) -> Result<(), StoreError> {
        Ok(self.upsert(isin, price, at).await?)
    }
}
