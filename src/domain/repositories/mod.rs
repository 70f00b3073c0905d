//! Capability traits for everything the core talks to
//!
//! Each trait is the smallest surface one collaborator needs. Implementations
//! live in `persistence` and `infrastructure`; tests supply hand-written mocks.

pub mod broker;
pub mod cash_ledger;
pub mod fx_source;
pub mod market_hours;
pub mod price_history;
pub mod rate_store;
pub mod settings;
pub mod trade_store;

pub use broker::{BrokerGateway, BrokerResult, OrderConfirmation, OrderRequest, PendingOrder};
pub use cash_ledger::CashLedger;
pub use fx_source::FxRateSource;
pub use market_hours::MarketHoursOracle;
pub use price_history::{PriceHistory, PricePoint, ReferencePriceSource};
pub use rate_store::{CachedRate, RateProvider, RateStore};
pub use settings::{CommissionConfigSource, CommissionSettings};
pub use trade_store::{DismissedFilterStore, TradeStore};
