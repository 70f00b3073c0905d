//! Database Models
//!
//! Persistent data structures for trades, retries, rates, filters and balances.

use crate::domain::repositories::{CachedRate, PricePoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Trade record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TradeRecord {
    pub id: i64,
    pub symbol: String,
    pub side: String, // "BUY" or "SELL"
    pub quantity: f64,
    pub price: f64,
    pub currency: String,
    pub source: String,
    pub mode: String, // "live" or "paper"
    pub executed_at: DateTime<Utc>,
    pub order_id: String,
}

/// Pending retry record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PendingRetryRecord {
    pub id: i64,
    pub symbol: String,
    pub side: String,
    pub quantity: f64,
    pub estimated_price: f64,
    pub currency: String,
    pub reason: String,
    pub failure_reason: String,
    pub attempts: i64,
    pub max_attempts: i64,
    pub status: String, // "pending", "completed" or "failed"
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Status of a pending retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStatus {
    Pending,
    Completed,
    Failed,
}

impl RetryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryStatus::Pending => "pending",
            RetryStatus::Completed => "completed",
            RetryStatus::Failed => "failed",
        }
    }
}

/// Exchange rate record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExchangeRateRecord {
    pub id: i64,
    pub from_currency: String,
    pub to_currency: String,
    pub rate: f64,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

impl From<ExchangeRateRecord> for CachedRate {
    fn from(record: ExchangeRateRecord) -> Self {
        CachedRate {
            from_currency: record.from_currency,
            to_currency: record.to_currency,
            rate: record.rate,
            source: record.source,
            fetched_at: record.fetched_at,
        }
    }
}

/// Dismissed filter record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DismissedFilterRecord {
    pub id: i64,
    pub isin: String,
    pub filter_name: String,
    pub dismissed_at: DateTime<Utc>,
}

/// Cash balance record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CashBalanceRecord {
    pub currency: String,
    pub amount: f64,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

/// Daily price record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DailyPriceRecord {
    pub isin: String,
    pub date: String,
    pub price: f64,
    pub recorded_at: DateTime<Utc>,
}

impl From<DailyPriceRecord> for PricePoint {
    fn from(record: DailyPriceRecord) -> Self {
        PricePoint {
            price: record.price,
            recorded_at: record.recorded_at,
        }
    }
}
