//! Trade execution errors with detailed context

use crate::domain::entities::execution::{ExecuteResult, ExecutionStatus};
use std::fmt;
use thiserror::Error;
use tracing::Level;

/// Why a recommendation did not end in a placed order
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TradeExecutionError {
    /// Malformed recommendation
    #[error("{reason}")]
    InvalidInput { reason: String },

    /// Broker session unavailable for the whole batch
    #[error("Broker not connected")]
    BrokerNotConnected,

    /// Exchange outside its trading session
    #[error("Market {exchange} is closed - trade scheduled for next market open")]
    MarketClosed { exchange: String },

    /// Same symbol traded within the cooldown window
    #[error("Trade frequency limit: wait {wait_seconds:.0} seconds before trading {symbol} again")]
    FrequencyLimit { symbol: String, wait_seconds: f64 },

    /// An order for the symbol is already open at the broker
    #[error("Pending order already exists for {symbol} (order ID: {order_id}, side: {side}, qty: {quantity:.0})")]
    PendingOrderExists {
        symbol: String,
        order_id: String,
        side: String,
        quantity: f64,
    },

    /// Stored price is too old and no fresh quote could be fetched
    #[error("Price data is stale (older than {max_age_hours:.0} hours) and refresh failed")]
    StalePrice { symbol: String, max_age_hours: f64 },

    /// Balance could not be ensured in the trade currency
    #[error("Insufficient funds for trade (need {required:.2} {currency}): {reason}")]
    InsufficientFunds {
        required: f64,
        currency: String,
        reason: String,
    },

    /// Broker refused or failed the order. Carries the broker's message.
    #[error("{reason}")]
    OrderPlacementFailed {
        reason: String,
        retry_scheduled: bool,
    },
}

impl TradeExecutionError {
    /// Terminal pipeline state this error maps to
    pub fn status(&self) -> ExecutionStatus {
        match self {
            TradeExecutionError::InvalidInput { .. } => ExecutionStatus::Error,
            TradeExecutionError::BrokerNotConnected => ExecutionStatus::Error,
            TradeExecutionError::OrderPlacementFailed { .. } => ExecutionStatus::Error,
            TradeExecutionError::MarketClosed { .. } => ExecutionStatus::Blocked,
            TradeExecutionError::FrequencyLimit { .. } => ExecutionStatus::Blocked,
            TradeExecutionError::PendingOrderExists { .. } => ExecutionStatus::Blocked,
            TradeExecutionError::StalePrice { .. } => ExecutionStatus::Blocked,
            TradeExecutionError::InsufficientFunds { .. } => ExecutionStatus::Blocked,
        }
    }

    /// Get the severity level of this error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TradeExecutionError::FrequencyLimit { .. } => ErrorSeverity::Minor,
            TradeExecutionError::MarketClosed { .. } => ErrorSeverity::Minor,
            TradeExecutionError::PendingOrderExists { .. } => ErrorSeverity::Minor,
            TradeExecutionError::InvalidInput { .. } => ErrorSeverity::Moderate,
            TradeExecutionError::StalePrice { .. } => ErrorSeverity::Moderate,
            TradeExecutionError::InsufficientFunds { .. } => ErrorSeverity::Moderate,
            TradeExecutionError::OrderPlacementFailed { .. } => ErrorSeverity::Critical,
            TradeExecutionError::BrokerNotConnected => ErrorSeverity::Critical,
        }
    }

    /// Check if this error is recoverable (retrying later might help)
    pub fn is_recoverable(&self) -> bool {
        match self {
            TradeExecutionError::MarketClosed { .. } => true,
            TradeExecutionError::FrequencyLimit { .. } => true,
            TradeExecutionError::PendingOrderExists { .. } => true,
            TradeExecutionError::StalePrice { .. } => true,
            TradeExecutionError::BrokerNotConnected => true,
            TradeExecutionError::OrderPlacementFailed {
                retry_scheduled, ..
            } => *retry_scheduled,

            TradeExecutionError::InvalidInput { .. } => false,
            TradeExecutionError::InsufficientFunds { .. } => false,
        }
    }

    /// Get a short error code for logging/monitoring
    pub fn error_code(&self) -> &'static str {
        match self {
            TradeExecutionError::InvalidInput { .. } => "ERR_INVALID_INPUT",
            TradeExecutionError::BrokerNotConnected => "ERR_BROKER_NOT_CONNECTED",
            TradeExecutionError::MarketClosed { .. } => "ERR_MARKET_CLOSED",
            TradeExecutionError::FrequencyLimit { .. } => "ERR_FREQUENCY_LIMIT",
            TradeExecutionError::PendingOrderExists { .. } => "ERR_PENDING_ORDER",
            TradeExecutionError::StalePrice { .. } => "ERR_STALE_PRICE",
            TradeExecutionError::InsufficientFunds { .. } => "ERR_INSUFFICIENT_FUNDS",
            TradeExecutionError::OrderPlacementFailed { .. } => "ERR_ORDER_PLACEMENT",
        }
    }

    /// Level the pipeline logs this error at
    pub fn log_level(&self) -> Level {
        match self.severity() {
            ErrorSeverity::Critical => Level::ERROR,
            ErrorSeverity::Moderate | ErrorSeverity::Minor => Level::WARN,
        }
    }

    /// Terminal result for `symbol`
    pub fn into_result(self, symbol: &str) -> ExecuteResult {
        let message = self.to_string();
        match self.status() {
            ExecutionStatus::Blocked => ExecuteResult::blocked(symbol, message),
            _ => ExecuteResult::error(symbol, message),
        }
    }
}

/// Severity levels for trade execution errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Expected during normal operation
    Minor,
    /// Indicates a problem with the input or the account
    Moderate,
    /// Requires attention
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Minor => write!(f, "Minor"),
            ErrorSeverity::Moderate => write!(f, "Moderate"),
            ErrorSeverity::Critical => write!(f, "Critical"),
        }
    }
}
