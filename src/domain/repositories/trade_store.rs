use crate::domain::entities::trade::{PendingRetry, Trade};
use crate::domain::errors::StoreError;
use async_trait::async_trait;

/// Audit trail of executed trades and queue of market-hours retries
#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn create_trade(&self, trade: &Trade) -> Result<(), StoreError>;

    async fn create_pending_retry(&self, retry: &PendingRetry) -> Result<(), StoreError>;
}

/// Advisory filters a user dismissed for a security
#[async_trait]
pub trait DismissedFilterStore: Send + Sync {
    /// Remove every dismissal for `isin`, returning how many were removed
    async fn clear_for_security(&self, isin: &str) -> Result<u64, StoreError>;
}
