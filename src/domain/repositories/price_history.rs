use crate::domain::errors::{RateError, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last known price of a security
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: f64,
    pub recorded_at: DateTime<Utc>,
}

impl PricePoint {
    /// Age of the point in hours relative to `now`
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.recorded_at).num_seconds() as f64 / 3600.0
    }
}

/// Daily price history keyed by ISIN
#[async_trait]
pub trait PriceHistory: Send + Sync {
    /// Most recent stored price, `None` when the security has no history
    async fn latest_price(&self, isin: &str) -> Result<Option<PricePoint>, StoreError>;

    /// Store `price` as the price of `isin` for the day of `at`
    async fn record_price(&self, isin: &str, price: f64, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Independent market-data quote used to sanity-check broker prices
#[async_trait]
pub trait ReferencePriceSource: Send + Sync {
    async fn current_price(&self, symbol: &str) -> Result<f64, RateError>;
}
