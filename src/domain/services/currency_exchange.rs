//! Currency Conversion Engine
//!
//! Resolves exchange rates and conversion paths over the hub-and-spoke
//! currency graph, and moves cash between ledger balances by placing market
//! orders on the FX instruments that connect the hub to each leaf currency.
//!
//! `ensure_balance` is the only code path that mutates the cash ledger. Calls
//! are serialised through an internal lock so the balance check, the FX
//! orders and the ledger transfer happen as one unit.

use crate::domain::entities::currency::{ConversionStep, CurrencyGraph};
use crate::domain::errors::{BrokerError, ConversionError, RateError};
use crate::domain::repositories::{BrokerGateway, CashLedger, FxRateSource, OrderRequest, RateProvider};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Default extra source currency converted on top of the shortfall
pub const DEFAULT_CONVERSION_FEE_BUFFER: f64 = 0.02;

/// What the pipeline needs from the conversion engine
#[async_trait]
pub trait CurrencyExchange: Send + Sync {
    /// Units of `to` per one unit of `from`
    async fn get_rate(&self, from: &str, to: &str) -> Result<f64, ConversionError>;

    /// Make sure the ledger holds at least `min_amount` of `currency`,
    /// converting from `source_currency` if needed.
    ///
    /// `Ok(false)` means there is not enough money to cover the amount.
    /// `Err` means the check or the conversion could not be carried out.
    async fn ensure_balance(
        &self,
        currency: &str,
        min_amount: f64,
        source_currency: &str,
    ) -> Result<bool, ConversionError>;
}

pub struct CurrencyExchangeService {
    graph: CurrencyGraph,
    broker: Arc<dyn BrokerGateway>,
    rates: Arc<dyn FxRateSource>,
    ledger: Arc<dyn CashLedger>,
    fee_buffer: f64,
    conversion_lock: Mutex<()>,
}

impl CurrencyExchangeService {
    pub fn new(
        graph: CurrencyGraph,
        broker: Arc<dyn BrokerGateway>,
        rates: Arc<dyn FxRateSource>,
        ledger: Arc<dyn CashLedger>,
    ) -> Self {
        Self {
            graph,
            broker,
            rates,
            ledger,
            fee_buffer: DEFAULT_CONVERSION_FEE_BUFFER,
            conversion_lock: Mutex::new(()),
        }
    }

    /// Override the conversion fee buffer (0.02 = convert 2% extra)
    pub fn with_fee_buffer(mut self, fee_buffer: f64) -> Self {
        if fee_buffer.is_finite() && fee_buffer >= 0.0 {
            self.fee_buffer = fee_buffer;
        } else {
            warn!(
                "Ignoring invalid conversion fee buffer {}, keeping {}",
                fee_buffer, self.fee_buffer
            );
        }
        self
    }

    /// Every currency the engine can price or convert, hub first
    pub fn available_currencies(&self) -> Vec<String> {
        self.graph.currencies()
    }

    fn normalize(currency: &str) -> String {
        currency.trim().to_uppercase()
    }

    fn require_known(&self, currency: &str) -> Result<(), ConversionError> {
        if self.graph.contains(currency) {
            Ok(())
        } else {
            Err(ConversionError::UnknownCurrency(currency.to_string()))
        }
    }

    /// Ordered FX legs converting `from` into `to`: empty for the same
    /// currency, one leg for a direct pair, two legs through the hub otherwise
    pub fn get_conversion_path(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Vec<ConversionStep>, ConversionError> {
        let from = Self::normalize(from);
        let to = Self::normalize(to);

        self.require_known(&from)?;
        self.require_known(&to)?;

        if from == to {
            return Ok(Vec::new());
        }

        if let Some(step) = self.graph.direct_step(&from, &to) {
            return Ok(vec![step]);
        }

        let hub = self.graph.hub();
        let first = self.graph.direct_step(&from, hub);
        let second = self.graph.direct_step(hub, &to);
        match (first, second) {
            (Some(first), Some(second)) => Ok(vec![first, second]),
            _ => Err(ConversionError::ConversionFailed {
                from,
                to,
                reason: "no conversion path".to_string(),
            }),
        }
    }

    /// Quote a single hop from the FX source, using `from` as the pricing base
    async fn quote_direct(&self, from: &str, to: &str) -> Result<f64, ConversionError> {
        let unavailable = |reason: String| ConversionError::RateUnavailable {
            from: from.to_string(),
            to: to.to_string(),
            reason,
        };

        let quotes = self
            .rates
            .get_fx_rates(from, &[to.to_string()])
            .await
            .map_err(|e| {
                warn!("FX quote {}/{} failed: {}", from, to, e);
                unavailable(e.to_string())
            })?;

        match quotes.get(to) {
            Some(rate) if rate.is_finite() && *rate > 0.0 => Ok(*rate),
            Some(rate) => Err(unavailable(format!("invalid rate {}", rate))),
            None => Err(unavailable("no quote returned".to_string())),
        }
    }

    async fn resolve_rate(&self, from: &str, to: &str) -> Result<f64, ConversionError> {
        let path = self.get_conversion_path(from, to)?;

        match path.as_slice() {
            [] => Ok(1.0),
            [step] => self.quote_direct(&step.from_currency, &step.to_currency).await,
            [first, second] => {
                let first_rate = self.quote_direct(&first.from_currency, &first.to_currency).await?;
                let second_rate = self
                    .quote_direct(&second.from_currency, &second.to_currency)
                    .await?;
                debug!(
                    "Rate {}/{} via {}: {} x {}",
                    from, to, first.to_currency, first_rate, second_rate
                );
                Ok(first_rate * second_rate)
            }
            _ => Err(ConversionError::ConversionFailed {
                from: from.to_string(),
                to: to.to_string(),
                reason: format!("unsupported path length {}", path.len()),
            }),
        }
    }

    /// Place a market order for one conversion leg
    async fn execute_step(&self, step: &ConversionStep, amount: f64) -> Result<(), ConversionError> {
        info!(
            action = %step.action,
            symbol = %step.symbol,
            amount,
            from = %step.from_currency,
            to = %step.to_currency,
            "Executing FX conversion"
        );

        let order = OrderRequest::market(&step.symbol, step.action, amount);
        self.broker
            .place_order(&order)
            .await
            .map(|confirmation| {
                debug!("FX order {} placed for {}", confirmation.order_id, step.symbol);
            })
            .map_err(|e| ConversionError::ConversionFailed {
                from: step.from_currency.clone(),
                to: step.to_currency.clone(),
                reason: e.to_string(),
            })
    }

    /// Convert `amount` of `from` into `to` and book the result in the ledger.
    ///
    /// Returns the amount of `to` credited.
    pub async fn exchange(&self, from: &str, to: &str, amount: f64) -> Result<f64, ConversionError> {
        let _guard = self.conversion_lock.lock().await;
        self.exchange_locked(&Self::normalize(from), &Self::normalize(to), amount)
            .await
    }

    async fn exchange_locked(&self, from: &str, to: &str, amount: f64) -> Result<f64, ConversionError> {
        if !amount.is_finite() || amount <= 0.0 {
            error!("Invalid exchange amount: {}", amount);
            return Err(ConversionError::InvalidAmount(amount));
        }
        if from == to {
            return Err(ConversionError::ConversionFailed {
                from: from.to_string(),
                to: to.to_string(),
                reason: "same currency exchange requested".to_string(),
            });
        }
        if !self.broker.is_connected().await {
            error!("Broker not connected for exchange {} -> {}", from, to);
            return Err(ConversionError::NotConnected);
        }

        let path = self.get_conversion_path(from, to)?;

        // Price every leg before placing anything so a quote failure leaves no
        // half-executed conversion behind
        let mut leg_rates = Vec::with_capacity(path.len());
        for step in &path {
            leg_rates.push(self.quote_direct(&step.from_currency, &step.to_currency).await?);
        }

        let mut current_amount = amount;
        for (step, rate) in path.iter().zip(leg_rates) {
            if let Err(e) = self.execute_step(step, current_amount).await {
                error!(
                    "Failed at conversion step {} -> {}: {}",
                    step.from_currency, step.to_currency, e
                );
                return Err(e);
            }
            current_amount *= rate;
        }

        self.ledger.transfer(from, amount, to, current_amount).await?;

        info!(
            "Converted {:.2} {} into {:.2} {}",
            amount, from, current_amount, to
        );
        Ok(current_amount)
    }
}

#[async_trait]
impl CurrencyExchange for CurrencyExchangeService {
    async fn get_rate(&self, from: &str, to: &str) -> Result<f64, ConversionError> {
        let from = Self::normalize(from);
        let to = Self::normalize(to);

        if from == to {
            return Ok(1.0);
        }

        if !self.broker.is_connected().await {
            return Err(ConversionError::RateUnavailable {
                from,
                to,
                reason: BrokerError::NotConnected.to_string(),
            });
        }

        self.resolve_rate(&from, &to).await
    }

    async fn ensure_balance(
        &self,
        currency: &str,
        min_amount: f64,
        source_currency: &str,
    ) -> Result<bool, ConversionError> {
        let currency = Self::normalize(currency);
        let source_currency = Self::normalize(source_currency);

        if !min_amount.is_finite() {
            return Err(ConversionError::InvalidAmount(min_amount));
        }

        let _guard = self.conversion_lock.lock().await;

        let current_balance = self.ledger.balance(&currency).await?;
        if current_balance >= min_amount {
            info!(
                currency = %currency,
                balance = current_balance,
                min_amount,
                "Sufficient balance"
            );
            return Ok(true);
        }

        if currency == source_currency {
            warn!(
                currency = %currency,
                balance = current_balance,
                min_amount,
                "Insufficient balance and nothing to convert from"
            );
            return Ok(false);
        }

        // Currencies outside the graph are fine until a conversion is needed
        self.require_known(&currency)?;
        self.require_known(&source_currency)?;

        let source_balance = self.ledger.balance(&source_currency).await?;
        if source_balance < 0.0 {
            error!(
                source_currency = %source_currency,
                source_balance,
                "Cannot ensure balance: source currency has negative balance"
            );
            return Err(ConversionError::ConversionFailed {
                from: source_currency.clone(),
                to: currency.clone(),
                reason: format!(
                    "source currency {} has negative balance: {:.2}",
                    source_currency, source_balance
                ),
            });
        }

        let needed = min_amount - current_balance;
        let needed_with_buffer = needed * (1.0 + self.fee_buffer);

        let rate = self.get_rate(&source_currency, &currency).await.map_err(|e| {
            error!("Could not get rate for {}/{}: {}", source_currency, currency, e);
            e
        })?;

        let source_amount = needed_with_buffer / rate;
        if source_balance < source_amount {
            warn!(
                source_currency = %source_currency,
                need = source_amount,
                have = source_balance,
                "Insufficient source currency to convert"
            );
            return Ok(false);
        }

        info!(
            amount = source_amount,
            from = %source_currency,
            to = %currency,
            needed,
            "Converting currency"
        );

        self.exchange_locked(&source_currency, &currency, source_amount)
            .await
            .map_err(|e| {
                error!("Failed to convert {} to {}: {}", source_currency, currency, e);
                e
            })?;

        Ok(true)
    }
}

/// Broker-quoted FX as one tier of the exchange rate cache
pub struct BrokerFxRateProvider {
    exchange: Arc<CurrencyExchangeService>,
}

impl BrokerFxRateProvider {
    pub fn new(exchange: Arc<CurrencyExchangeService>) -> Self {
        Self { exchange }
    }
}

#[async_trait]
impl RateProvider for BrokerFxRateProvider {
    fn name(&self) -> &str {
        "broker"
    }

    async fn fetch_rate(&self, from: &str, to: &str) -> Result<f64, RateError> {
        self.exchange
            .get_rate(from, to)
            .await
            .map_err(|e| RateError::Provider {
                provider: self.name().to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::trade::TradeSide;
    use crate::domain::errors::LedgerError;
    use crate::domain::repositories::{BrokerResult, OrderConfirmation, PendingOrder};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct MockBroker {
        connected: AtomicBool,
        fail_orders: bool,
        orders: StdMutex<Vec<OrderRequest>>,
    }

    impl MockBroker {
        fn new() -> Self {
            Self {
                connected: AtomicBool::new(true),
                fail_orders: false,
                orders: StdMutex::new(Vec::new()),
            }
        }

        fn orders(&self) -> Vec<OrderRequest> {
            self.orders.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BrokerGateway for MockBroker {
        async fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn place_order(&self, order: &OrderRequest) -> BrokerResult<OrderConfirmation> {
            self.orders.lock().unwrap().push(order.clone());
            if self.fail_orders {
                return Err(BrokerError::OrderRejected("instrument suspended".to_string()));
            }
            Ok(OrderConfirmation {
                order_id: "fx-order-123".to_string(),
                symbol: order.symbol.clone(),
                side: order.side,
                quantity: order.quantity,
                price: 1.1,
            })
        }

        async fn get_pending_orders(&self) -> BrokerResult<Vec<PendingOrder>> {
            Ok(Vec::new())
        }

        async fn get_quotes(&self, _symbols: &[String]) -> BrokerResult<HashMap<String, f64>> {
            Ok(HashMap::new())
        }
    }

    /// Rates keyed by "FROM:TO"
    struct MockFxSource {
        rates: HashMap<String, f64>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl MockFxSource {
        fn new(rates: &[(&str, &str, f64)]) -> Self {
            Self {
                rates: rates
                    .iter()
                    .map(|(f, t, r)| (format!("{}:{}", f, t), *r))
                    .collect(),
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FxRateSource for MockFxSource {
        async fn get_fx_rates(
            &self,
            base_currency: &str,
            targets: &[String],
        ) -> Result<HashMap<String, f64>, BrokerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BrokerError::Network("connection reset".to_string()));
            }
            Ok(targets
                .iter()
                .filter_map(|t| {
                    self.rates
                        .get(&format!("{}:{}", base_currency, t))
                        .map(|r| (t.clone(), *r))
                })
                .collect())
        }
    }

    struct MockLedger {
        balances: StdMutex<HashMap<String, f64>>,
    }

    impl MockLedger {
        fn new(balances: &[(&str, f64)]) -> Self {
            Self {
                balances: StdMutex::new(
                    balances.iter().map(|(c, a)| (c.to_string(), *a)).collect(),
                ),
            }
        }

        fn get(&self, currency: &str) -> f64 {
            *self.balances.lock().unwrap().get(currency).unwrap_or(&0.0)
        }
    }

    #[async_trait]
    impl CashLedger for MockLedger {
        async fn balance(&self, currency: &str) -> Result<f64, LedgerError> {
            Ok(self.get(currency))
        }

        async fn balances(&self) -> Result<HashMap<String, f64>, LedgerError> {
            Ok(self.balances.lock().unwrap().clone())
        }

        async fn transfer(
            &self,
            from_currency: &str,
            from_amount: f64,
            to_currency: &str,
            to_amount: f64,
        ) -> Result<(), LedgerError> {
            let mut balances = self.balances.lock().unwrap();
            let available = *balances.get(from_currency).unwrap_or(&0.0);
            if available < from_amount {
                return Err(LedgerError::InsufficientFunds {
                    currency: from_currency.to_string(),
                    required: from_amount,
                    available,
                });
            }
            *balances.entry(from_currency.to_string()).or_insert(0.0) -= from_amount;
            *balances.entry(to_currency.to_string()).or_insert(0.0) += to_amount;
            Ok(())
        }
    }

    struct Fixture {
        service: CurrencyExchangeService,
        broker: Arc<MockBroker>,
        fx: Arc<MockFxSource>,
        ledger: Arc<MockLedger>,
    }

    fn fixture(broker: MockBroker, fx: MockFxSource, ledger: MockLedger) -> Fixture {
        let broker = Arc::new(broker);
        let fx = Arc::new(fx);
        let ledger = Arc::new(ledger);
        let service = CurrencyExchangeService::new(
            CurrencyGraph::eur_hub(),
            broker.clone(),
            fx.clone(),
            ledger.clone(),
        );
        Fixture {
            service,
            broker,
            fx,
            ledger,
        }
    }

    fn standard_rates() -> MockFxSource {
        MockFxSource::new(&[
            ("EUR", "USD", 1.1),
            ("USD", "EUR", 0.9),
            ("EUR", "GBP", 0.85),
            ("GBP", "EUR", 1.2),
            ("EUR", "HKD", 8.5),
            ("HKD", "EUR", 0.11),
        ])
    }

    #[test]
    fn test_available_currencies() {
        let f = fixture(MockBroker::new(), standard_rates(), MockLedger::new(&[]));
        let currencies = f.service.available_currencies();
        assert_eq!(currencies.len(), 4);
        for expected in ["EUR", "USD", "GBP", "HKD"] {
            assert!(currencies.contains(&expected.to_string()));
        }
    }

    #[test]
    fn test_conversion_path_lengths() {
        let f = fixture(MockBroker::new(), standard_rates(), MockLedger::new(&[]));

        assert!(f.service.get_conversion_path("EUR", "EUR").unwrap().is_empty());
        assert_eq!(f.service.get_conversion_path("EUR", "USD").unwrap().len(), 1);
        assert_eq!(f.service.get_conversion_path("USD", "EUR").unwrap().len(), 1);
        assert_eq!(f.service.get_conversion_path("GBP", "EUR").unwrap().len(), 1);

        let path = f.service.get_conversion_path("GBP", "HKD").unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].from_currency, "GBP");
        assert_eq!(path[0].to_currency, "EUR");
        assert_eq!(path[1].from_currency, "EUR");
        assert_eq!(path[1].to_currency, "HKD");
    }

    #[test]
    fn test_every_path_is_chained_and_short() {
        let f = fixture(MockBroker::new(), standard_rates(), MockLedger::new(&[]));
        let currencies = f.service.available_currencies();

        for from in &currencies {
            for to in &currencies {
                let path = f.service.get_conversion_path(from, to).unwrap();
                assert!(path.len() <= 2, "{} -> {} took {} steps", from, to, path.len());
                for pair in path.windows(2) {
                    assert_eq!(pair[0].to_currency, pair[1].from_currency);
                }
                if let (Some(first), Some(last)) = (path.first(), path.last()) {
                    assert_eq!(&first.from_currency, from);
                    assert_eq!(&last.to_currency, to);
                }
            }
        }
    }

    #[test]
    fn test_conversion_path_unknown_currency() {
        let f = fixture(MockBroker::new(), standard_rates(), MockLedger::new(&[]));
        let result = f.service.get_conversion_path("INVALID", "EUR");
        assert_eq!(
            result,
            Err(ConversionError::UnknownCurrency("INVALID".to_string()))
        );
    }

    #[tokio::test]
    async fn test_same_currency_rate_makes_no_calls() {
        let f = fixture(MockBroker::new(), standard_rates(), MockLedger::new(&[]));
        for currency in ["EUR", "USD", "GBP", "HKD", "JPY"] {
            assert_eq!(f.service.get_rate(currency, currency).await.unwrap(), 1.0);
        }
        assert_eq!(f.fx.calls(), 0);
    }

    #[tokio::test]
    async fn test_direct_rate_is_the_quote() {
        let f = fixture(MockBroker::new(), standard_rates(), MockLedger::new(&[]));
        assert_eq!(f.service.get_rate("EUR", "USD").await.unwrap(), 1.1);
        assert_eq!(f.service.get_rate("HKD", "EUR").await.unwrap(), 0.11);
        assert_eq!(f.fx.calls(), 2);
    }

    #[tokio::test]
    async fn test_indirect_rate_is_product_of_hops() {
        let f = fixture(MockBroker::new(), standard_rates(), MockLedger::new(&[]));
        let rate = f.service.get_rate("GBP", "HKD").await.unwrap();
        assert_eq!(rate, 1.2 * 8.5);
        assert_eq!(f.fx.calls(), 2);
    }

    #[tokio::test]
    async fn test_rate_unavailable_when_source_fails() {
        let mut fx = standard_rates();
        fx.fail = true;
        let f = fixture(MockBroker::new(), fx, MockLedger::new(&[]));

        let result = f.service.get_rate("EUR", "USD").await;
        assert!(matches!(result, Err(ConversionError::RateUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_rate_unavailable_when_quote_missing() {
        let fx = MockFxSource::new(&[("EUR", "GBP", 0.85)]);
        let f = fixture(MockBroker::new(), fx, MockLedger::new(&[]));

        let result = f.service.get_rate("EUR", "USD").await;
        assert!(matches!(result, Err(ConversionError::RateUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_rate_unavailable_when_not_connected() {
        let broker = MockBroker::new();
        broker.connected.store(false, Ordering::SeqCst);
        let f = fixture(broker, standard_rates(), MockLedger::new(&[]));

        let result = f.service.get_rate("EUR", "USD").await;
        assert!(matches!(result, Err(ConversionError::RateUnavailable { .. })));
        assert_eq!(f.fx.calls(), 0);
    }

    #[tokio::test]
    async fn test_ensure_balance_already_sufficient() {
        let f = fixture(
            MockBroker::new(),
            standard_rates(),
            MockLedger::new(&[("USD", 500.0), ("EUR", 1000.0)]),
        );

        assert!(f.service.ensure_balance("USD", 400.0, "EUR").await.unwrap());
        assert!(f.broker.orders().is_empty());
        assert_eq!(f.ledger.get("USD"), 500.0);
        assert_eq!(f.ledger.get("EUR"), 1000.0);
    }

    #[tokio::test]
    async fn test_ensure_balance_off_graph_currency_already_funded() {
        let f = fixture(
            MockBroker::new(),
            standard_rates(),
            MockLedger::new(&[("JPY", 1_000_000.0), ("EUR", 1000.0)]),
        );

        assert!(f.service.ensure_balance("jpy", 10_000.0, "EUR").await.unwrap());
        assert!(f.broker.orders().is_empty());
        assert_eq!(f.fx.calls(), 0);
        assert_eq!(f.ledger.get("JPY"), 1_000_000.0);
    }

    #[tokio::test]
    async fn test_ensure_balance_off_graph_currency_short_is_unknown() {
        let f = fixture(
            MockBroker::new(),
            standard_rates(),
            MockLedger::new(&[("JPY", 100.0), ("EUR", 1000.0)]),
        );

        assert_eq!(
            f.service.ensure_balance("JPY", 10_000.0, "EUR").await,
            Err(ConversionError::UnknownCurrency("JPY".to_string()))
        );
        assert!(f.broker.orders().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_balance_same_currency_insufficient() {
        let f = fixture(
            MockBroker::new(),
            standard_rates(),
            MockLedger::new(&[("EUR", 100.0)]),
        );

        assert!(!f.service.ensure_balance("EUR", 400.0, "EUR").await.unwrap());
        assert!(f.broker.orders().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_balance_converts_with_buffer() {
        let f = fixture(
            MockBroker::new(),
            standard_rates(),
            MockLedger::new(&[("USD", 100.0), ("EUR", 1000.0)]),
        );

        assert!(f.service.ensure_balance("USD", 320.0, "EUR").await.unwrap());

        // shortfall 220 USD, +2% buffer, at 1.1 USD per EUR
        let expected_eur = 220.0 * 1.02 / 1.1;
        let orders = f.broker.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].symbol, "EURUSD_T0.ITS");
        assert_eq!(orders[0].side, TradeSide::Sell);
        assert_eq!(orders[0].limit_price, 0.0);
        assert!((orders[0].quantity - expected_eur).abs() < 1e-9);

        assert!(f.ledger.get("USD") >= 320.0);
        assert!((f.ledger.get("EUR") - (1000.0 - expected_eur)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_ensure_balance_insufficient_source() {
        let f = fixture(
            MockBroker::new(),
            standard_rates(),
            MockLedger::new(&[("USD", 0.0), ("EUR", 50.0)]),
        );

        assert!(!f.service.ensure_balance("USD", 1000.0, "EUR").await.unwrap());
        assert!(f.broker.orders().is_empty());
        assert_eq!(f.ledger.get("EUR"), 50.0);
    }

    #[tokio::test]
    async fn test_ensure_balance_rejects_negative_source() {
        let f = fixture(
            MockBroker::new(),
            standard_rates(),
            MockLedger::new(&[("USD", 0.0), ("EUR", -20.0)]),
        );

        let result = f.service.ensure_balance("USD", 10.0, "EUR").await;
        assert!(matches!(result, Err(ConversionError::ConversionFailed { .. })));
        assert!(f.broker.orders().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_balance_two_step_conversion() {
        let f = fixture(
            MockBroker::new(),
            standard_rates(),
            MockLedger::new(&[("GBP", 1000.0)]),
        );

        assert!(f.service.ensure_balance("HKD", 850.0, "GBP").await.unwrap());

        let orders = f.broker.orders();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].symbol, "EURGBP_T0.ITS");
        assert_eq!(orders[0].side, TradeSide::Buy);
        assert_eq!(orders[1].symbol, "HKD/EUR");
        assert_eq!(orders[1].side, TradeSide::Buy);
        // second leg is sized in EUR from the first leg's rate
        assert!((orders[1].quantity - orders[0].quantity * 1.2).abs() < 1e-9);
        assert!(f.ledger.get("HKD") >= 850.0);
        assert!(f.ledger.get("GBP") >= 0.0);
    }

    #[tokio::test]
    async fn test_ensure_balance_order_failure_leaves_ledger_untouched() {
        let mut broker = MockBroker::new();
        broker.fail_orders = true;
        let f = fixture(
            broker,
            standard_rates(),
            MockLedger::new(&[("USD", 0.0), ("EUR", 1000.0)]),
        );

        let result = f.service.ensure_balance("USD", 100.0, "EUR").await;
        assert!(matches!(result, Err(ConversionError::ConversionFailed { .. })));
        assert_eq!(f.ledger.get("EUR"), 1000.0);
        assert_eq!(f.ledger.get("USD"), 0.0);
    }

    #[tokio::test]
    async fn test_exchange_rejects_invalid_requests() {
        let f = fixture(
            MockBroker::new(),
            standard_rates(),
            MockLedger::new(&[("EUR", 1000.0)]),
        );

        assert_eq!(
            f.service.exchange("EUR", "USD", 0.0).await,
            Err(ConversionError::InvalidAmount(0.0))
        );
        assert!(f.service.exchange("EUR", "EUR", 10.0).await.is_err());

        f.broker.connected.store(false, Ordering::SeqCst);
        assert_eq!(
            f.service.exchange("EUR", "USD", 10.0).await,
            Err(ConversionError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_broker_fx_provider_wraps_engine() {
        let f = fixture(MockBroker::new(), standard_rates(), MockLedger::new(&[]));
        let provider = BrokerFxRateProvider::new(Arc::new(f.service));
        assert_eq!(provider.name(), "broker");
        assert_eq!(provider.fetch_rate("EUR", "USD").await.unwrap(), 1.1);
        assert!(matches!(
            provider.fetch_rate("EUR", "JPY").await,
            Err(RateError::Provider { .. })
        ));
    }
}
