//! Trade entities - recommendations in, executed trades and pending retries out

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Direction of a trade or FX conversion leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }

    /// The opposite side, used when a currency pair is traversed backwards
    pub fn opposite(&self) -> TradeSide {
        match self {
            TradeSide::Buy => TradeSide::Sell,
            TradeSide::Sell => TradeSide::Buy,
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TradeSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(TradeSide::Buy),
            "SELL" => Ok(TradeSide::Sell),
            other => Err(format!("Invalid side: {} (must be BUY or SELL)", other)),
        }
    }
}

/// An intent to trade, supplied by the planning layer
///
/// `side` is kept as the raw wire string so that malformed input can be
/// reported as an `error` result instead of failing deserialization of a
/// whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecommendation {
    /// Security identifier used for internal bookkeeping (ISIN)
    #[serde(default)]
    pub isin: String,
    /// Broker-facing symbol, optionally suffixed with an exchange code (`VOW3.DE`)
    pub symbol: String,
    pub side: String,
    pub quantity: f64,
    pub estimated_price: f64,
    pub currency: String,
    #[serde(default)]
    pub reason: String,
}

impl TradeRecommendation {
    pub fn new(
        isin: &str,
        symbol: &str,
        side: TradeSide,
        quantity: f64,
        estimated_price: f64,
        currency: &str,
        reason: &str,
    ) -> Self {
        Self {
            isin: isin.to_string(),
            symbol: symbol.to_string(),
            side: side.as_str().to_string(),
            quantity,
            estimated_price,
            currency: currency.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Parsed side, `None` when the wire value is not BUY or SELL
    pub fn trade_side(&self) -> Option<TradeSide> {
        self.side.parse().ok()
    }

    pub fn trade_value(&self) -> f64 {
        self.quantity * self.estimated_price
    }
}

/// Record of a successfully placed order. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub price: f64,
    pub currency: String,
    pub source: String,
    pub mode: String,
    pub executed_at: DateTime<Utc>,
    pub order_id: String,
}

/// A trade rejected for a market-hours reason, kept for later resubmission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRetry {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub estimated_price: f64,
    pub currency: String,
    pub reason: String,
    pub failure_reason: String,
    pub max_attempts: u32,
}

impl PendingRetry {
    pub fn from_recommendation(
        rec: &TradeRecommendation,
        side: TradeSide,
        failure_reason: &str,
        max_attempts: u32,
    ) -> Self {
        Self {
            symbol: rec.symbol.clone(),
            side,
            quantity: rec.quantity,
            estimated_price: rec.estimated_price,
            currency: rec.currency.clone(),
            reason: rec.reason.clone(),
            failure_reason: failure_reason.to_string(),
            max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_side_parse() {
        assert_eq!("BUY".parse::<TradeSide>(), Ok(TradeSide::Buy));
        assert_eq!("SELL".parse::<TradeSide>(), Ok(TradeSide::Sell));
        assert!("buy".parse::<TradeSide>().is_err());
        assert!("HOLD".parse::<TradeSide>().is_err());
    }

    #[test]
    fn test_trade_side_opposite() {
        assert_eq!(TradeSide::Buy.opposite(), TradeSide::Sell);
        assert_eq!(TradeSide::Sell.opposite(), TradeSide::Buy);
    }

    #[test]
    fn test_recommendation_deserializes_with_defaults() {
        let json = r#"{"symbol":"AAPL.US","side":"BUY","quantity":10,"estimated_price":150.0,"currency":"USD"}"#;
        let rec: TradeRecommendation = serde_json::from_str(json).unwrap();
        assert_eq!(rec.isin, "");
        assert_eq!(rec.trade_side(), Some(TradeSide::Buy));
        assert_eq!(rec.trade_value(), 1500.0);
    }

    #[test]
    fn test_pending_retry_copies_recommendation() {
        let rec = TradeRecommendation::new(
            "US0378331005",
            "AAPL.US",
            TradeSide::Buy,
            5.0,
            180.0,
            "USD",
            "rebalance",
        );
        let retry = PendingRetry::from_recommendation(&rec, TradeSide::Buy, "market closed", 3);
        assert_eq!(retry.symbol, "AAPL.US");
        assert_eq!(retry.reason, "rebalance");
        assert_eq!(retry.failure_reason, "market closed");
        assert_eq!(retry.max_attempts, 3);
    }
}
