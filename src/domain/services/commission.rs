//! Commission estimate for balance assurance
//!
//! Fixed fee in the hub currency, converted to the trade currency, plus a
//! percentage of trade value. Both come from the configuration source when
//! one is wired and reachable, otherwise from the defaults.

use super::currency_exchange::CurrencyExchange;
use crate::domain::repositories::{CommissionConfigSource, CommissionSettings};
use std::sync::Arc;
use tracing::warn;

pub struct CommissionCalculator {
    hub_currency: String,
    defaults: CommissionSettings,
    source: Option<Arc<dyn CommissionConfigSource>>,
}

impl CommissionCalculator {
    pub fn new(hub_currency: &str, defaults: CommissionSettings) -> Self {
        Self {
            hub_currency: hub_currency.to_uppercase(),
            defaults,
            source: None,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn CommissionConfigSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub async fn settings(&self) -> CommissionSettings {
        let Some(source) = &self.source else {
            return self.defaults;
        };

        match source.get_default_config().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load commission settings, using defaults: {}", e);
                self.defaults
            }
        }
    }

    /// Total commission in `trade_currency`
    pub async fn calculate(
        &self,
        trade_value: f64,
        trade_currency: &str,
        exchange: &dyn CurrencyExchange,
    ) -> f64 {
        let settings = self.settings().await;
        let variable = trade_value * settings.percent;

        let fixed = if trade_currency.eq_ignore_ascii_case(&self.hub_currency) {
            settings.fixed
        } else {
            match exchange.get_rate(&self.hub_currency, trade_currency).await {
                Ok(rate) if rate > 0.0 => settings.fixed * rate,
                Ok(rate) => {
                    warn!(
                        currency = %trade_currency,
                        rate,
                        "Invalid rate for commission conversion, using {} amount",
                        self.hub_currency
                    );
                    settings.fixed
                }
                Err(e) => {
                    warn!(
                        currency = %trade_currency,
                        "Failed to convert commission to trade currency, using {} amount: {}",
                        self.hub_currency,
                        e
                    );
                    settings.fixed
                }
            }
        };

        fixed + variable
    }
}
