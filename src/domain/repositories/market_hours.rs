use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Answers whether an exchange is in its trading session
#[async_trait]
pub trait MarketHoursOracle: Send + Sync {
    async fn is_market_open(&self, exchange_code: &str, at: DateTime<Utc>) -> bool;
}
