pub mod commission;
pub mod currency_exchange;
pub mod exchange_rate_cache;
pub mod order_error_classifier;
pub mod trade_execution;
pub mod trade_execution_error;
pub mod trade_frequency;
