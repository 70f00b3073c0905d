use crate::domain::repositories::CommissionSettings;
use crate::domain::services::currency_exchange::DEFAULT_CONVERSION_FEE_BUFFER;
use crate::domain::services::exchange_rate_cache::DEFAULT_MAX_RATE_AGE_HOURS;
use crate::domain::services::trade_execution::ExecutionSettings;
use crate::infrastructure::exchange_rate_api::DEFAULT_EXCHANGE_RATE_API_URL;
use crate::infrastructure::yahoo_fx::DEFAULT_YAHOO_CHART_URL;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration for execution, conversion and rate caching
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub hub_currency: String,
    pub trade_cooldown_seconds: u64,
    pub conversion_fee_buffer: f64, // Extra source amount bought on conversion (0.02 = 2%)
    pub balance_safety_margin: f64, // Margin on trade value + commission (0.01 = 1%)
    pub max_price_age_hours: u64,
    pub pending_retry_max_attempts: u32,
    pub default_fixed_commission: f64, // In hub currency
    pub default_percent_commission: f64,
    pub trade_source_tag: String,

    // Exchange rate cache
    pub rate_max_age_hours: i64,
    pub sync_currencies: Vec<String>,
    pub rate_sync_interval_seconds: u64,
    pub rate_api_url: String,
    pub market_data_url: String,
    pub http_timeout_seconds: u64,

    // Dry run
    pub recommendations_file: Option<String>,
    pub paper_starting_balance: f64, // Seeded in the hub currency when the ledger is empty
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            hub_currency: "EUR".to_string(),
            trade_cooldown_seconds: 300,
            conversion_fee_buffer: DEFAULT_CONVERSION_FEE_BUFFER,
            balance_safety_margin: 0.01,
            max_price_age_hours: 48,
            pending_retry_max_attempts: 3,
            default_fixed_commission: 2.0,
            default_percent_commission: 0.002,
            trade_source_tag: "trade_execution".to_string(),

            rate_max_age_hours: DEFAULT_MAX_RATE_AGE_HOURS,
            sync_currencies: ["EUR", "USD", "GBP", "HKD"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            rate_sync_interval_seconds: 3600,
            rate_api_url: DEFAULT_EXCHANGE_RATE_API_URL.to_string(),
            market_data_url: DEFAULT_YAHOO_CHART_URL.to_string(),
            http_timeout_seconds: 10,

            recommendations_file: None,
            paper_starting_balance: 10_000.0,
        }
    }
}

impl ExecutionConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup. Invalid values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(hub) = lookup("HUB_CURRENCY") {
            let hub = hub.trim().to_uppercase();
            if hub.len() == 3 && hub.chars().all(|c| c.is_ascii_alphabetic()) {
                config.hub_currency = hub;
            } else {
                tracing::warn!(
                    "Invalid HUB_CURRENCY value: {} (must be a 3-letter code), using default: {}",
                    hub,
                    config.hub_currency
                );
            }
        }

        parse_into(&lookup, "TRADE_COOLDOWN_SECONDS", &mut config.trade_cooldown_seconds, |_| true);
        parse_into(&lookup, "CONVERSION_FEE_BUFFER", &mut config.conversion_fee_buffer, |v| {
            (0.0..=0.5).contains(v)
        });
        parse_into(&lookup, "BALANCE_SAFETY_MARGIN", &mut config.balance_safety_margin, |v| {
            (0.0..=0.5).contains(v)
        });
        parse_into(&lookup, "MAX_PRICE_AGE_HOURS", &mut config.max_price_age_hours, |v| *v > 0);
        parse_into(
            &lookup,
            "PENDING_RETRY_MAX_ATTEMPTS",
            &mut config.pending_retry_max_attempts,
            |v| *v > 0,
        );
        parse_into(
            &lookup,
            "DEFAULT_FIXED_COMMISSION",
            &mut config.default_fixed_commission,
            |v| v.is_finite() && *v >= 0.0,
        );
        parse_into(
            &lookup,
            "DEFAULT_PERCENT_COMMISSION",
            &mut config.default_percent_commission,
            |v| (0.0..=0.1).contains(v),
        );

        if let Some(tag) = lookup("TRADE_SOURCE_TAG") {
            if !tag.trim().is_empty() {
                config.trade_source_tag = tag.trim().to_string();
            }
        }

        parse_into(&lookup, "RATE_MAX_AGE_HOURS", &mut config.rate_max_age_hours, |v| *v > 0);

        if let Some(currencies) = lookup("SYNC_CURRENCIES") {
            let parsed: Vec<String> = currencies
                .split(',')
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty())
                .collect();
            if parsed.is_empty() {
                tracing::warn!(
                    "Invalid SYNC_CURRENCIES value: '{}', using default: {:?}",
                    currencies,
                    config.sync_currencies
                );
            } else {
                config.sync_currencies = parsed;
            }
        }

        parse_into(
            &lookup,
            "RATE_SYNC_INTERVAL_SECONDS",
            &mut config.rate_sync_interval_seconds,
            |v| *v >= 60,
        );

        if let Some(url) = lookup("RATE_API_URL") {
            config.rate_api_url = url;
        }
        if let Some(url) = lookup("MARKET_DATA_URL") {
            config.market_data_url = url;
        }

        parse_into(&lookup, "HTTP_TIMEOUT_SECONDS", &mut config.http_timeout_seconds, |v| {
            *v > 0 && *v <= 120
        });

        config.recommendations_file = lookup("RECOMMENDATIONS_FILE").filter(|p| !p.trim().is_empty());
        parse_into(
            &lookup,
            "PAPER_STARTING_BALANCE",
            &mut config.paper_starting_balance,
            |v| v.is_finite() && *v >= 0.0,
        );

        config
    }

    pub fn commission_defaults(&self) -> CommissionSettings {
        CommissionSettings {
            fixed: self.default_fixed_commission,
            percent: self.default_percent_commission,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    pub fn rate_sync_interval(&self) -> Duration {
        Duration::from_secs(self.rate_sync_interval_seconds)
    }

    /// Pipeline settings; `mode` is "live" or "paper"
    pub fn execution_settings(&self, mode: &str) -> ExecutionSettings {
        ExecutionSettings {
            hub_currency: self.hub_currency.clone(),
            trade_cooldown: Duration::from_secs(self.trade_cooldown_seconds),
            balance_safety_margin: self.balance_safety_margin,
            max_price_age: Duration::from_secs(self.max_price_age_hours * 3600),
            pending_retry_max_attempts: self.pending_retry_max_attempts,
            commission_defaults: self.commission_defaults(),
            source_tag: self.trade_source_tag.clone(),
            mode: mode.to_string(),
        }
    }
}

/// Parse `key` into `target` when present and accepted by `valid`
fn parse_into<T, F, V>(lookup: &F, key: &str, target: &mut T, valid: V)
where
    T: FromStr + Display,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
    V: Fn(&T) -> bool,
{
    let Some(raw) = lookup(key) else {
        return;
    };

    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => *target = value,
        Ok(value) => {
            tracing::warn!(
                "Invalid {} value: {}, using default: {}",
                key,
                value,
                target
            );
        }
        Err(e) => {
            tracing::warn!(
                "Failed to parse {} '{}': {}, using default: {}",
                key,
                raw,
                e,
                target
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ExecutionConfig::default();
        assert_eq!(config.hub_currency, "EUR");
        assert_eq!(config.trade_cooldown_seconds, 300);
        assert_eq!(config.conversion_fee_buffer, 0.02);
        assert_eq!(config.balance_safety_margin, 0.01);
        assert_eq!(config.pending_retry_max_attempts, 3);
        assert_eq!(config.max_price_age_hours, 48);
        assert_eq!(config.rate_max_age_hours, 48);
        assert_eq!(config.sync_currencies, vec!["EUR", "USD", "GBP", "HKD"]);
        assert_eq!(config.rate_api_url, "https://open.er-api.com/v6/latest");
        assert!(config.recommendations_file.is_none());
    }

    #[test]
    fn test_overrides_from_lookup() {
        let config = ExecutionConfig::from_lookup(lookup(&[
            ("HUB_CURRENCY", "usd"),
            ("TRADE_COOLDOWN_SECONDS", "60"),
            ("MAX_PRICE_AGE_HOURS", "24"),
            ("DEFAULT_FIXED_COMMISSION", "1.5"),
            ("SYNC_CURRENCIES", "eur, usd ,"),
            ("RECOMMENDATIONS_FILE", "batch.json"),
        ]));

        assert_eq!(config.hub_currency, "USD");
        assert_eq!(config.trade_cooldown_seconds, 60);
        assert_eq!(config.max_price_age_hours, 24);
        assert_eq!(config.commission_defaults().fixed, 1.5);
        assert_eq!(config.sync_currencies, vec!["EUR", "USD"]);
        assert_eq!(config.recommendations_file.as_deref(), Some("batch.json"));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = ExecutionConfig::from_lookup(lookup(&[
            ("HUB_CURRENCY", "EURO"),
            ("TRADE_COOLDOWN_SECONDS", "soon"),
            ("CONVERSION_FEE_BUFFER", "2.0"),
            ("PENDING_RETRY_MAX_ATTEMPTS", "0"),
            ("MAX_PRICE_AGE_HOURS", "0"),
            ("SYNC_CURRENCIES", " , "),
            ("RATE_SYNC_INTERVAL_SECONDS", "5"),
        ]));

        let defaults = ExecutionConfig::default();
        assert_eq!(config.hub_currency, defaults.hub_currency);
        assert_eq!(config.trade_cooldown_seconds, defaults.trade_cooldown_seconds);
        assert_eq!(config.conversion_fee_buffer, defaults.conversion_fee_buffer);
        assert_eq!(config.pending_retry_max_attempts, defaults.pending_retry_max_attempts);
        assert_eq!(config.max_price_age_hours, defaults.max_price_age_hours);
        assert_eq!(config.sync_currencies, defaults.sync_currencies);
        assert_eq!(config.rate_sync_interval_seconds, defaults.rate_sync_interval_seconds);
    }

    #[test]
    fn test_execution_settings() {
        let settings = ExecutionConfig::default().execution_settings("paper");
        assert_eq!(settings.hub_currency, "EUR");
        assert_eq!(settings.trade_cooldown, Duration::from_secs(300));
        assert_eq!(settings.max_price_age, Duration::from_secs(48 * 3600));
        assert_eq!(settings.mode, "paper");
        assert_eq!(settings.source_tag, "trade_execution");
        assert_eq!(settings.commission_defaults, CommissionSettings::default());
    }
}
