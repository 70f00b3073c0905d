//! Trade Execution Pipeline
//!
//! Turns a `TradeRecommendation` into a placed market order. Every
//! recommendation runs through the same ordered stages and ends in exactly
//! one terminal state:
//!
//! 1. input validation (`error`)
//! 2. market hours (`blocked`)
//! 3. trade frequency (`blocked`)
//! 4. open orders at the broker (`blocked`)
//! 5. price freshness, refreshed from broker quotes when stale (`blocked`)
//! 6. balance assurance, BUY only (`blocked`)
//! 7. order placement (`error`, market-hours rejections are queued for retry)
//! 8. recording and housekeeping (best-effort, never downgrade `success`)
//!
//! Each stage returns `Result<_, TradeExecutionError>`; the terminal
//! `ExecuteResult` is derived from the error's status.

use super::commission::CommissionCalculator;
use super::currency_exchange::CurrencyExchange;
use super::order_error_classifier::{OrderErrorClassifier, PhraseClassifier};
use super::trade_execution_error::TradeExecutionError;
use super::trade_frequency::TradeFrequencyGuard;
use crate::domain::entities::execution::{ExecuteResult, ExecutionEvent};
use crate::domain::entities::trade::{PendingRetry, Trade, TradeRecommendation, TradeSide};
use crate::domain::repositories::{
    BrokerGateway, CommissionConfigSource, CommissionSettings, DismissedFilterStore,
    MarketHoursOracle, OrderConfirmation, OrderRequest, PriceHistory, ReferencePriceSource,
    TradeStore,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn, Level};

/// Exchange code assumed for symbols without a `.EXCHANGE` suffix
pub const DEFAULT_EXCHANGE_CODE: &str = "US";

/// Broker quotes this far above the reference price are replaced by it
pub const PRICE_ANOMALY_RATIO: f64 = 1.5;

/// Tunables of the pipeline
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    /// Currency used as conversion source and commission base
    pub hub_currency: String,
    /// Minimum time between two trades of the same symbol
    pub trade_cooldown: Duration,
    /// Extra margin on top of trade value plus commission (0.01 = 1%)
    pub balance_safety_margin: f64,
    /// Stored prices older than this are refreshed before trading
    pub max_price_age: Duration,
    /// Attempts allowed for a market-hours retry
    pub pending_retry_max_attempts: u32,
    /// Commission used when no configuration source answers
    pub commission_defaults: CommissionSettings,
    /// Recorded as `Trade.source`
    pub source_tag: String,
    /// Recorded as `Trade.mode` ("live" or "paper")
    pub mode: String,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            hub_currency: "EUR".to_string(),
            trade_cooldown: Duration::from_secs(300),
            balance_safety_margin: 0.01,
            max_price_age: Duration::from_secs(48 * 3600),
            pending_retry_max_attempts: 3,
            commission_defaults: CommissionSettings::default(),
            source_tag: "trade_execution".to_string(),
            mode: "live".to_string(),
        }
    }
}

pub struct TradeExecutionService {
    broker: Arc<dyn BrokerGateway>,
    exchange: Arc<dyn CurrencyExchange>,
    trade_store: Arc<dyn TradeStore>,
    market_hours: Option<Arc<dyn MarketHoursOracle>>,
    dismissed_filters: Option<Arc<dyn DismissedFilterStore>>,
    price_history: Option<Arc<dyn PriceHistory>>,
    reference_prices: Option<Arc<dyn ReferencePriceSource>>,
    classifier: Box<dyn OrderErrorClassifier>,
    commission: CommissionCalculator,
    frequency: TradeFrequencyGuard,
    events: Option<broadcast::Sender<ExecutionEvent>>,
    settings: ExecutionSettings,
    execution_lock: Mutex<()>,
}

impl TradeExecutionService {
    pub fn new(
        broker: Arc<dyn BrokerGateway>,
        exchange: Arc<dyn CurrencyExchange>,
        trade_store: Arc<dyn TradeStore>,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            broker,
            exchange,
            trade_store,
            market_hours: None,
            dismissed_filters: None,
            price_history: None,
            reference_prices: None,
            classifier: Box::new(PhraseClassifier::default()),
            commission: CommissionCalculator::new(
                &settings.hub_currency,
                settings.commission_defaults,
            ),
            frequency: TradeFrequencyGuard::new(settings.trade_cooldown),
            events: None,
            settings,
            execution_lock: Mutex::new(()),
        }
    }

    pub fn with_market_hours(mut self, oracle: Arc<dyn MarketHoursOracle>) -> Self {
        self.market_hours = Some(oracle);
        self
    }

    pub fn with_dismissed_filters(mut self, store: Arc<dyn DismissedFilterStore>) -> Self {
        self.dismissed_filters = Some(store);
        self
    }

    pub fn with_price_history(mut self, history: Arc<dyn PriceHistory>) -> Self {
        self.price_history = Some(history);
        self
    }

    /// Second price source consulted when a stale price is refreshed
    pub fn with_reference_prices(mut self, source: Arc<dyn ReferencePriceSource>) -> Self {
        self.reference_prices = Some(source);
        self
    }

    pub fn with_commission_source(mut self, source: Arc<dyn CommissionConfigSource>) -> Self {
        self.commission = self.commission.with_source(source);
        self
    }

    pub fn with_classifier(mut self, classifier: Box<dyn OrderErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_event_sender(mut self, sender: broadcast::Sender<ExecutionEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Receiver for execution events, if an event channel is configured
    pub fn subscribe(&self) -> Option<broadcast::Receiver<ExecutionEvent>> {
        self.events.as_ref().map(|sender| sender.subscribe())
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    /// Execute a batch in order, one result per recommendation
    pub async fn execute_trades(&self, recommendations: &[TradeRecommendation]) -> Vec<ExecuteResult> {
        let _guard = self.execution_lock.lock().await;

        if !self.broker.is_connected().await {
            error!("Broker not connected, rejecting {} trades", recommendations.len());
            return recommendations
                .iter()
                .map(|rec| TradeExecutionError::BrokerNotConnected.into_result(&rec.symbol))
                .collect();
        }

        let mut results = Vec::with_capacity(recommendations.len());
        for rec in recommendations {
            let result = match self.run_pipeline(rec).await {
                Ok(()) => ExecuteResult::success(&rec.symbol),
                Err(e) => e.into_result(&rec.symbol),
            };
            results.push(result);
        }
        results
    }

    /// Execute one recommendation for the planning layer
    pub async fn execute_trade(&self, rec: &TradeRecommendation) -> Result<(), TradeExecutionError> {
        let _guard = self.execution_lock.lock().await;
        self.run_pipeline(rec).await
    }

    async fn run_pipeline(&self, rec: &TradeRecommendation) -> Result<(), TradeExecutionError> {
        info!(
            symbol = %rec.symbol,
            side = %rec.side,
            quantity = rec.quantity,
            estimated_price = rec.estimated_price,
            reason = %rec.reason,
            "Executing trade"
        );

        let side = Self::validate_input(rec).map_err(|e| {
            Self::log_rejection(rec, "Trade rejected as malformed", &e);
            e
        })?;

        self.run_stage("market hours", rec, self.check_market_hours(rec)).await?;
        self.run_stage("frequency", rec, self.check_frequency(rec)).await?;
        self.run_stage("pending order", rec, self.check_pending_orders(rec)).await?;
        self.run_stage("price staleness", rec, self.check_price_freshness(rec)).await?;
        if side == TradeSide::Buy {
            self.run_stage("balance", rec, self.ensure_funds(rec)).await?;
        }

        let confirmation = self.place_order(rec, side).await.map_err(|e| {
            Self::log_rejection(rec, "Order placement failed", &e);
            e
        })?;

        self.record_trade(rec, side, &confirmation).await;
        info!(
            symbol = %rec.symbol,
            order_id = %confirmation.order_id,
            "Trade executed successfully"
        );

        self.frequency.record(&rec.symbol).await;
        self.clear_dismissed_filters(rec).await;

        Ok(())
    }

    async fn run_stage<F>(&self, stage: &str, rec: &TradeRecommendation, check: F) -> Result<(), TradeExecutionError>
    where
        F: std::future::Future<Output = Result<(), TradeExecutionError>>,
    {
        check.await.map_err(|e| {
            Self::log_rejection(rec, &format!("Trade blocked by {} check", stage), &e);
            e
        })
    }

    fn log_rejection(rec: &TradeRecommendation, message: &str, e: &TradeExecutionError) {
        if e.log_level() == Level::ERROR {
            error!(
                symbol = %rec.symbol,
                error = %e,
                code = e.error_code(),
                severity = %e.severity(),
                recoverable = e.is_recoverable(),
                "{}",
                message
            );
        } else {
            warn!(
                symbol = %rec.symbol,
                error = %e,
                code = e.error_code(),
                severity = %e.severity(),
                recoverable = e.is_recoverable(),
                "{}",
                message
            );
        }
    }

    fn validate_input(rec: &TradeRecommendation) -> Result<TradeSide, TradeExecutionError> {
        let invalid = |reason: String| TradeExecutionError::InvalidInput { reason };

        if rec.symbol.is_empty() {
            return Err(invalid("Symbol cannot be empty".to_string()));
        }
        if !(rec.quantity > 0.0) {
            return Err(invalid(format!(
                "Invalid quantity: {:.4} (must be positive)",
                rec.quantity
            )));
        }
        if !(rec.estimated_price > 0.0) {
            return Err(invalid(format!(
                "Invalid price: {:.2} (must be positive)",
                rec.estimated_price
            )));
        }
        rec.side.parse::<TradeSide>().map_err(invalid)
    }

    /// Exchange code from the `SYMBOL.EXCHANGE` suffix
    pub fn exchange_code(symbol: &str) -> &str {
        match symbol.rsplit_once('.') {
            Some((_, code)) if !code.is_empty() => code,
            _ => DEFAULT_EXCHANGE_CODE,
        }
    }

    async fn check_market_hours(&self, rec: &TradeRecommendation) -> Result<(), TradeExecutionError> {
        let Some(oracle) = &self.market_hours else {
            debug!(symbol = %rec.symbol, "Market hours oracle not configured, skipping check");
            return Ok(());
        };

        let exchange = Self::exchange_code(&rec.symbol);
        if oracle.is_market_open(exchange, Utc::now()).await {
            Ok(())
        } else {
            Err(TradeExecutionError::MarketClosed {
                exchange: exchange.to_string(),
            })
        }
    }

    async fn check_frequency(&self, rec: &TradeRecommendation) -> Result<(), TradeExecutionError> {
        match self.frequency.remaining(&rec.symbol).await {
            Some(remaining) => Err(TradeExecutionError::FrequencyLimit {
                symbol: rec.symbol.clone(),
                wait_seconds: remaining.as_secs_f64(),
            }),
            None => Ok(()),
        }
    }

    async fn check_pending_orders(&self, rec: &TradeRecommendation) -> Result<(), TradeExecutionError> {
        if !self.broker.is_connected().await {
            return Ok(());
        }

        let pending = match self.broker.get_pending_orders().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(symbol = %rec.symbol, "Failed to check pending orders, proceeding with trade: {}", e);
                return Ok(());
            }
        };

        match pending.into_iter().find(|order| order.symbol == rec.symbol) {
            Some(order) => Err(TradeExecutionError::PendingOrderExists {
                symbol: rec.symbol.clone(),
                order_id: order.order_id,
                side: order.side,
                quantity: order.quantity,
            }),
            None => Ok(()),
        }
    }

    async fn check_price_freshness(&self, rec: &TradeRecommendation) -> Result<(), TradeExecutionError> {
        let Some(history) = &self.price_history else {
            debug!(symbol = %rec.symbol, "Price history not configured, skipping staleness check");
            return Ok(());
        };
        if rec.isin.is_empty() {
            warn!(symbol = %rec.symbol, "No ISIN for symbol, skipping staleness check");
            return Ok(());
        }

        let max_age_hours = self.settings.max_price_age.as_secs_f64() / 3600.0;
        let now = Utc::now();

        match history.latest_price(&rec.isin).await {
            Ok(Some(point)) if point.age_hours(now) <= max_age_hours => return Ok(()),
            Ok(Some(point)) => warn!(
                symbol = %rec.symbol,
                isin = %rec.isin,
                age_hours = point.age_hours(now),
                "Price data is stale, attempting to refresh from broker"
            ),
            Ok(None) => warn!(
                symbol = %rec.symbol,
                isin = %rec.isin,
                "No stored price, attempting to refresh from broker"
            ),
            Err(e) => warn!(
                symbol = %rec.symbol,
                isin = %rec.isin,
                "Price history lookup failed, attempting to refresh from broker: {}",
                e
            ),
        }

        let quote = match self.broker.get_quotes(&[rec.symbol.clone()]).await {
            Ok(quotes) => quotes
                .get(&rec.symbol)
                .copied()
                .filter(|price| price.is_finite() && *price > 0.0),
            Err(e) => {
                error!(symbol = %rec.symbol, "Quote request failed: {}", e);
                None
            }
        };
        let Some(mut price) = quote else {
            error!(symbol = %rec.symbol, "Failed to fetch fresh price from broker");
            return Err(TradeExecutionError::StalePrice {
                symbol: rec.symbol.clone(),
                max_age_hours,
            });
        };

        if let Some(reference) = &self.reference_prices {
            match reference.current_price(&rec.symbol).await {
                Ok(reference_price) if reference_price > 0.0 && price > reference_price * PRICE_ANOMALY_RATIO => {
                    warn!(
                        symbol = %rec.symbol,
                        broker_price = price,
                        reference_price,
                        "Price anomaly: broker price more than 50% above reference, using reference price"
                    );
                    price = reference_price;
                }
                Ok(_) => {}
                Err(e) => debug!(symbol = %rec.symbol, "Reference price unavailable: {}", e),
            }
        }

        match history.record_price(&rec.isin, price, now).await {
            Ok(()) => info!(symbol = %rec.symbol, price, "Refreshed stale price from broker"),
            Err(e) => warn!(
                symbol = %rec.symbol,
                price,
                "Failed to store refreshed price, proceeding with trade: {}",
                e
            ),
        }
        Ok(())
    }

    async fn ensure_funds(&self, rec: &TradeRecommendation) -> Result<(), TradeExecutionError> {
        let trade_value = rec.trade_value();
        let commission = self
            .commission
            .calculate(trade_value, &rec.currency, self.exchange.as_ref())
            .await;
        let required = (trade_value + commission) * (1.0 + self.settings.balance_safety_margin);

        info!(
            symbol = %rec.symbol,
            currency = %rec.currency,
            trade_value,
            commission,
            total_needed = required,
            "Ensuring sufficient balance before trade"
        );

        let insufficient = |reason: String| TradeExecutionError::InsufficientFunds {
            required,
            currency: rec.currency.clone(),
            reason,
        };

        match self
            .exchange
            .ensure_balance(&rec.currency, required, &self.settings.hub_currency)
            .await
        {
            Ok(true) => {
                info!(
                    symbol = %rec.symbol,
                    currency = %rec.currency,
                    ensured_amount = required,
                    "Successfully ensured currency balance"
                );
                Ok(())
            }
            Ok(false) => Err(insufficient("insufficient balance".to_string())),
            Err(e) => {
                error!(
                    symbol = %rec.symbol,
                    currency = %rec.currency,
                    needed = required,
                    "Failed to ensure currency balance: {}",
                    e
                );
                Err(insufficient(e.to_string()))
            }
        }
    }

    async fn place_order(
        &self,
        rec: &TradeRecommendation,
        side: TradeSide,
    ) -> Result<OrderConfirmation, TradeExecutionError> {
        let order = OrderRequest::market(&rec.symbol, side, rec.quantity);

        let e = match self.broker.place_order(&order).await {
            Ok(confirmation) => return Ok(confirmation),
            Err(e) => e,
        };

        let message = e.to_string();

        let mut retry_scheduled = false;
        if self.classifier.is_market_hours_error(&message) {
            info!(
                symbol = %rec.symbol,
                error = %message,
                "Market hours error detected, storing for retry"
            );
            let retry = PendingRetry::from_recommendation(
                rec,
                side,
                &message,
                self.settings.pending_retry_max_attempts,
            );
            match self.trade_store.create_pending_retry(&retry).await {
                Ok(()) => retry_scheduled = true,
                Err(e) => error!(symbol = %rec.symbol, "Failed to store pending retry: {}", e),
            }
        }

        Err(TradeExecutionError::OrderPlacementFailed {
            reason: message,
            retry_scheduled,
        })
    }

    /// Fill price for the audit record. Market orders may come back unpriced.
    async fn fill_price(&self, rec: &TradeRecommendation, confirmation: &OrderConfirmation) -> f64 {
        if confirmation.price > 0.0 {
            return confirmation.price;
        }

        match self.broker.get_quotes(&[rec.symbol.clone()]).await {
            Ok(quotes) => match quotes.get(&rec.symbol) {
                Some(price) if *price > 0.0 => *price,
                _ => rec.estimated_price,
            },
            Err(e) => {
                debug!(symbol = %rec.symbol, "Quote lookup for fill price failed: {}", e);
                rec.estimated_price
            }
        }
    }

    async fn record_trade(&self, rec: &TradeRecommendation, side: TradeSide, confirmation: &OrderConfirmation) {
        let price = self.fill_price(rec, confirmation).await;
        let trade = Trade {
            symbol: if confirmation.symbol.is_empty() {
                rec.symbol.clone()
            } else {
                confirmation.symbol.clone()
            },
            side,
            quantity: if confirmation.quantity > 0.0 {
                confirmation.quantity
            } else {
                rec.quantity
            },
            price,
            currency: rec.currency.clone(),
            source: self.settings.source_tag.clone(),
            mode: self.settings.mode.clone(),
            executed_at: Utc::now(),
            order_id: confirmation.order_id.clone(),
        };

        if let Err(e) = self.trade_store.create_trade(&trade).await {
            warn!(symbol = %rec.symbol, "Trade executed but failed to record: {}", e);
            return;
        }

        if let Some(sender) = &self.events {
            let event = ExecutionEvent::TradeExecuted {
                symbol: trade.symbol,
                side: trade.side,
                quantity: trade.quantity,
                price: trade.price,
                order_id: trade.order_id,
                source: trade.source,
                executed_at: trade.executed_at,
            };
            // No subscribers is fine
            let _ = sender.send(event);
        }
    }

    async fn clear_dismissed_filters(&self, rec: &TradeRecommendation) {
        if rec.isin.is_empty() {
            return;
        }
        let Some(store) = &self.dismissed_filters else {
            return;
        };

        match store.clear_for_security(&rec.isin).await {
            Ok(0) => {}
            Ok(cleared) => info!(isin = %rec.isin, cleared, "Cleared dismissed filters after trade"),
            Err(e) => warn!(isin = %rec.isin, "Failed to clear dismissed filters after trade: {}", e),
        }
    }
}
