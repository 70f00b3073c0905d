use crate::domain::errors::{RateError, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted exchange rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRate {
    pub from_currency: String,
    pub to_currency: String,
    pub rate: f64,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

/// Persistent storage for fetched exchange rates
#[async_trait]
pub trait RateStore: Send + Sync {
    async fn save_rate(&self, rate: &CachedRate) -> Result<(), StoreError>;

    /// Newest stored rate for the pair
    async fn latest_rate(&self, from: &str, to: &str) -> Result<Option<CachedRate>, StoreError>;
}

/// A live source of exchange rates, one tier of the rate cache
#[async_trait]
pub trait RateProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Units of `to` per one unit of `from`
    async fn fetch_rate(&self, from: &str, to: &str) -> Result<f64, RateError>;
}
