pub mod exchange_rate_api;
pub mod market_hours;
pub mod paper_broker;
pub mod yahoo_fx;
