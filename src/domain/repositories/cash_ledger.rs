use crate::domain::errors::LedgerError;
use async_trait::async_trait;
use std::collections::HashMap;

/// Per-currency cash balances
///
/// Only the conversion engine mutates the ledger. `transfer` must be atomic:
/// either both legs are applied or neither is.
#[async_trait]
pub trait CashLedger: Send + Sync {
    /// Current balance in `currency`, 0.0 when the currency has never been held
    async fn balance(&self, currency: &str) -> Result<f64, LedgerError>;

    /// All non-empty balances
    async fn balances(&self) -> Result<HashMap<String, f64>, LedgerError>;

    /// Debit `from_amount` of `from_currency` and credit `to_amount` of
    /// `to_currency`. Fails with `InsufficientFunds` and applies nothing if the
    /// source balance is below `from_amount`.
    async fn transfer(
        &self,
        from_currency: &str,
        from_amount: f64,
        to_currency: &str,
        to_amount: f64,
    ) -> Result<(), LedgerError>;
}
