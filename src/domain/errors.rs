//! Domain error types shared by the conversion engine, rate cache and pipeline

use thiserror::Error;

/// Errors raised by a broker gateway
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BrokerError {
    #[error("Broker not connected")]
    NotConnected,

    /// The broker refused the order. The message is the broker's own text.
    #[error("{0}")]
    OrderRejected(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Broker API error: {0}")]
    Api(String),
}

/// Errors raised by the cash ledger
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LedgerError {
    #[error("Insufficient {currency} balance: required {required:.2}, available {available:.2}")]
    InsufficientFunds {
        currency: String,
        required: f64,
        available: f64,
    },

    #[error("Invalid ledger amount: {0}")]
    InvalidAmount(f64),

    /// The balance row changed between read and write
    #[error("Concurrent update on {0} balance")]
    Conflict(String),

    #[error("Ledger storage error: {0}")]
    Storage(String),
}

/// Errors raised by the currency conversion engine
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConversionError {
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Rate unavailable for {from}/{to}: {reason}")]
    RateUnavailable {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Broker not connected")]
    NotConnected,

    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    #[error("Conversion {from} -> {to} failed: {reason}")]
    ConversionFailed {
        from: String,
        to: String,
        reason: String,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Errors raised by the exchange rate cache and its providers
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RateError {
    #[error("No exchange rate available for {from}/{to}")]
    NoRateAvailable { from: String, to: String },

    #[error("{provider} failed: {reason}")]
    Provider { provider: String, reason: String },

    #[error("{provider} returned invalid rate {rate}")]
    InvalidRate { provider: String, rate: f64 },

    #[error("Rate sync failed for all {attempted} currency pairs")]
    SyncFailed { attempted: usize },
}

/// Errors raised by the commission configuration source
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigSourceError {
    #[error("Configuration unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Errors raised by persistent stores behind the repository traits
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store query failed: {0}")]
    Query(String),
}
