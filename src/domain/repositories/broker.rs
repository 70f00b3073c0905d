//! Broker Gateway Trait
//!
//! The narrow capability the pipeline and the conversion engine need from a
//! brokerage: order placement, connectivity, open orders and quotes. Keeping
//! it this small lets the paper broker and test mocks stand in for the live
//! broker without any adapter code.

use crate::domain::entities::trade::TradeSide;
use crate::domain::errors::BrokerError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Common result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// An order as submitted to the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: f64,
    /// Zero means a market order
    pub limit_price: f64,
}

impl OrderRequest {
    /// Market order: executes immediately at the best available price
    pub fn market(symbol: &str, side: TradeSide, quantity: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            quantity,
            limit_price: 0.0,
        }
    }

    pub fn is_market(&self) -> bool {
        self.limit_price == 0.0
    }
}

/// Broker acknowledgement of a placed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: f64,
    /// Fill price; brokers report 0.0 when a market order has not been priced yet
    pub price: f64,
}

/// An order still open at the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub order_id: String,
    pub symbol: String,
    pub side: String,
    pub quantity: f64,
}

#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Whether the session with the broker is currently usable
    async fn is_connected(&self) -> bool;

    /// Place an order and return the broker's confirmation
    async fn place_order(&self, order: &OrderRequest) -> BrokerResult<OrderConfirmation>;

    /// All orders that are open at the broker
    async fn get_pending_orders(&self) -> BrokerResult<Vec<PendingOrder>>;

    /// Last prices for the given symbols. Symbols without a quote are absent.
    async fn get_quotes(&self, symbols: &[String]) -> BrokerResult<HashMap<String, f64>>;
}
