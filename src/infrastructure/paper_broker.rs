//! Paper broker for dry runs
//!
//! Fills every market order immediately at the configured quote and serves
//! FX rates from a static table. Paired with `InMemoryCashLedger` it lets the
//! whole pipeline run without a brokerage account.

use crate::domain::errors::{BrokerError, LedgerError};
use crate::domain::repositories::{
    BrokerGateway, BrokerResult, CashLedger, FxRateSource, OrderConfirmation, OrderRequest,
    PendingOrder,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct PaperBroker {
    connected: AtomicBool,
    next_order_id: AtomicU64,
    /// (base, target) -> units of target per unit of base
    fx_rates: HashMap<(String, String), f64>,
    quotes: HashMap<String, f64>,
    /// symbol -> rejection message
    rejections: HashMap<String, String>,
    pending_orders: Vec<PendingOrder>,
    filled: Mutex<Vec<OrderConfirmation>>,
}

impl PaperBroker {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            next_order_id: AtomicU64::new(1),
            fx_rates: HashMap::new(),
            quotes: HashMap::new(),
            rejections: HashMap::new(),
            pending_orders: Vec::new(),
            filled: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fx_rate(mut self, base: &str, target: &str, rate: f64) -> Self {
        self.fx_rates
            .insert((base.to_uppercase(), target.to_uppercase()), rate);
        self
    }

    pub fn with_quote(mut self, symbol: &str, price: f64) -> Self {
        self.quotes.insert(symbol.to_string(), price);
        self
    }

    /// Reject every order for `symbol` with `message`
    pub fn with_rejection(mut self, symbol: &str, message: &str) -> Self {
        self.rejections
            .insert(symbol.to_string(), message.to_string());
        self
    }

    pub fn with_pending_order(mut self, order: PendingOrder) -> Self {
        self.pending_orders.push(order);
        self
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Orders filled so far, oldest first
    pub async fn filled_orders(&self) -> Vec<OrderConfirmation> {
        self.filled.lock().await.clone()
    }

    fn fx_rate(&self, base: &str, target: &str) -> Option<f64> {
        if base == target {
            return Some(1.0);
        }
        if let Some(rate) = self.fx_rates.get(&(base.to_string(), target.to_string())) {
            return Some(*rate);
        }
        self.fx_rates
            .get(&(target.to_string(), base.to_string()))
            .filter(|rate| **rate > 0.0)
            .map(|rate| 1.0 / rate)
    }
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerGateway for PaperBroker {
    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn place_order(&self, order: &OrderRequest) -> BrokerResult<OrderConfirmation> {
        if !self.is_connected().await {
            return Err(BrokerError::NotConnected);
        }
        if let Some(message) = self.rejections.get(&order.symbol) {
            return Err(BrokerError::OrderRejected(message.clone()));
        }
        if !(order.quantity > 0.0) {
            return Err(BrokerError::OrderRejected(format!(
                "Invalid quantity {}",
                order.quantity
            )));
        }

        let order_id = format!("paper-{}", self.next_order_id.fetch_add(1, Ordering::SeqCst));
        let confirmation = OrderConfirmation {
            order_id,
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            price: self.quotes.get(&order.symbol).copied().unwrap_or(0.0),
        };

        info!(
            order_id = %confirmation.order_id,
            symbol = %confirmation.symbol,
            side = %confirmation.side,
            quantity = confirmation.quantity,
            price = confirmation.price,
            "Paper order filled"
        );
        self.filled.lock().await.push(confirmation.clone());
        Ok(confirmation)
    }

    async fn get_pending_orders(&self) -> BrokerResult<Vec<PendingOrder>> {
        Ok(self.pending_orders.clone())
    }

    async fn get_quotes(&self, symbols: &[String]) -> BrokerResult<HashMap<String, f64>> {
        Ok(symbols
            .iter()
            .filter_map(|symbol| self.quotes.get(symbol).map(|price| (symbol.clone(), *price)))
            .collect())
    }
}

#[async_trait]
impl FxRateSource for PaperBroker {
    async fn get_fx_rates(
        &self,
        base_currency: &str,
        targets: &[String],
    ) -> Result<HashMap<String, f64>, BrokerError> {
        if !self.is_connected().await {
            return Err(BrokerError::NotConnected);
        }

        let base = base_currency.to_uppercase();
        let rates: HashMap<String, f64> = targets
            .iter()
            .filter_map(|target| {
                self.fx_rate(&base, &target.to_uppercase())
                    .map(|rate| (target.clone(), rate))
            })
            .collect();

        debug!("Paper FX rates for {}: {:?}", base, rates);
        Ok(rates)
    }
}

/// Cash balances held in memory
#[derive(Default)]
pub struct InMemoryCashLedger {
    balances: Mutex<HashMap<String, f64>>,
}

impl InMemoryCashLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(mut self, currency: &str, amount: f64) -> Self {
        self.balances
            .get_mut()
            .insert(currency.to_uppercase(), amount);
        self
    }

    pub async fn deposit(&self, currency: &str, amount: f64) -> Result<(), LedgerError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        *self
            .balances
            .lock()
            .await
            .entry(currency.to_uppercase())
            .or_insert(0.0) += amount;
        Ok(())
    }
}

#[async_trait]
impl CashLedger for InMemoryCashLedger {
    async fn balance(&self, currency: &str) -> Result<f64, LedgerError> {
        Ok(self
            .balances
            .lock()
            .await
            .get(&currency.to_uppercase())
            .copied()
            .unwrap_or(0.0))
    }

    async fn balances(&self) -> Result<HashMap<String, f64>, LedgerError> {
        Ok(self
            .balances
            .lock()
            .await
            .iter()
            .filter(|(_, amount)| **amount != 0.0)
            .map(|(currency, amount)| (currency.clone(), *amount))
            .collect())
    }

    async fn transfer(
        &self,
        from_currency: &str,
        from_amount: f64,
        to_currency: &str,
        to_amount: f64,
    ) -> Result<(), LedgerError> {
        for amount in [from_amount, to_amount] {
            if !amount.is_finite() || amount <= 0.0 {
                return Err(LedgerError::InvalidAmount(amount));
            }
        }

        let from = from_currency.to_uppercase();
        let to = to_currency.to_uppercase();
        let mut balances = self.balances.lock().await;

        let available = balances.get(&from).copied().unwrap_or(0.0);
        if available < from_amount {
            return Err(LedgerError::InsufficientFunds {
                currency: from,
                required: from_amount,
                available,
            });
        }

        balances.insert(from, available - from_amount);
        *balances.entry(to).or_insert(0.0) += to_amount;
        Ok(())
    }
}
