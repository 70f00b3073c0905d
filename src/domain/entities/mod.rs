pub mod currency;
pub mod execution;
pub mod trade;
