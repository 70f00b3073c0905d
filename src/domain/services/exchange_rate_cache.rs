//! Exchange Rate Cache
//!
//! Tiered rate resolution used when the conversion engine alone is not
//! enough. Tiers are tried strictly in order and a tier is only consulted
//! when every earlier one failed or produced a non-positive rate:
//!
//! 1. primary rate API
//! 2. broker-quoted FX (the conversion engine)
//! 3. secondary market-data provider
//! 4. last persisted rate (stale rates are used, only logged)
//! 5. hardcoded constants
//!
//! Rates from the three live tiers are written back to the store. That write
//! is best-effort and never fails the lookup.

use crate::domain::errors::{RateError, StoreError};
use crate::domain::repositories::{CachedRate, RateProvider, RateStore};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const CACHE_SOURCE: &str = "cache";
pub const HARDCODED_SOURCE: &str = "hardcoded";

/// Default age after which a persisted rate is reported as stale
pub const DEFAULT_MAX_RATE_AGE_HOURS: i64 = 48;

/// A resolved rate and the tier that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateQuote {
    pub from: String,
    pub to: String,
    pub rate: f64,
    pub source: String,
}

/// One entry of the fallback chain as exposed to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackTier {
    pub order: usize,
    pub source: String,
    pub condition: &'static str,
}

/// Outcome of a `sync_rates` run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub attempted: usize,
    pub succeeded: Vec<RateQuote>,
    pub failed: Vec<(String, String, String)>,
}

impl SyncReport {
    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }
}

pub struct ExchangeRateCacheService {
    primary_api: Option<Arc<dyn RateProvider>>,
    broker_fx: Option<Arc<dyn RateProvider>>,
    market_data: Option<Arc<dyn RateProvider>>,
    store: Option<Arc<dyn RateStore>>,
    fallback_rates: HashMap<(String, String), f64>,
    fallback_base: String,
    max_age: Duration,
    sync_currencies: Vec<String>,
}

impl ExchangeRateCacheService {
    pub fn new() -> Self {
        let mut fallback_rates = HashMap::new();
        fallback_rates.insert(("USD".to_string(), "EUR".to_string()), 0.9);
        fallback_rates.insert(("GBP".to_string(), "EUR".to_string()), 1.2);
        fallback_rates.insert(("HKD".to_string(), "EUR".to_string()), 0.11);

        Self {
            primary_api: None,
            broker_fx: None,
            market_data: None,
            store: None,
            fallback_rates,
            fallback_base: "EUR".to_string(),
            max_age: Duration::hours(DEFAULT_MAX_RATE_AGE_HOURS),
            sync_currencies: ["EUR", "USD", "GBP", "HKD"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }

    pub fn with_primary_api(mut self, provider: Arc<dyn RateProvider>) -> Self {
        self.primary_api = Some(provider);
        self
    }

    pub fn with_broker_fx(mut self, provider: Arc<dyn RateProvider>) -> Self {
        self.broker_fx = Some(provider);
        self
    }

    pub fn with_market_data(mut self, provider: Arc<dyn RateProvider>) -> Self {
        self.market_data = Some(provider);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn RateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_max_age_hours(mut self, hours: i64) -> Self {
        if hours > 0 {
            self.max_age = Duration::hours(hours);
        } else {
            warn!("Ignoring non-positive rate max age {}h", hours);
        }
        self
    }

    pub fn with_sync_currencies(mut self, currencies: Vec<String>) -> Self {
        let mut seen = HashSet::new();
        self.sync_currencies = currencies
            .iter()
            .map(|c| normalize(c))
            .filter(|c| seen.insert(c.clone()))
            .collect();
        self
    }

    fn live_tiers(&self) -> impl Iterator<Item = &Arc<dyn RateProvider>> {
        [&self.primary_api, &self.broker_fx, &self.market_data]
            .into_iter()
            .flatten()
    }

    /// Tier names in the order they are consulted
    pub fn fallback_chain(&self) -> Vec<FallbackTier> {
        let mut sources: Vec<String> = self.live_tiers().map(|p| p.name().to_string()).collect();
        sources.push(CACHE_SOURCE.to_string());
        sources.push(HARDCODED_SOURCE.to_string());

        let last = sources.len();
        sources
            .into_iter()
            .enumerate()
            .map(|(i, source)| FallbackTier {
                order: i + 1,
                source,
                condition: match i + 1 {
                    1 => "always_try_first",
                    n if n == last => "if_all_else_fails",
                    _ => "if_previous_fails",
                },
            })
            .collect()
    }

    /// Resolve a rate, falling through the tiers
    pub async fn get_rate(&self, from: &str, to: &str) -> Result<f64, RateError> {
        self.resolve(from, to).await.map(|quote| quote.rate)
    }

    /// Resolve a rate and report which tier produced it
    pub async fn resolve(&self, from: &str, to: &str) -> Result<RateQuote, RateError> {
        let from = normalize(from);
        let to = normalize(to);

        if from == to {
            return Ok(RateQuote {
                from,
                to,
                rate: 1.0,
                source: "identity".to_string(),
            });
        }

        for provider in self.live_tiers() {
            match provider.fetch_rate(&from, &to).await {
                Ok(rate) if rate.is_finite() && rate > 0.0 => {
                    debug!("Rate {}/{} = {} from {}", from, to, rate, provider.name());
                    let quote = RateQuote {
                        from: from.clone(),
                        to: to.clone(),
                        rate,
                        source: provider.name().to_string(),
                    };
                    self.persist(&quote).await;
                    return Ok(quote);
                }
                Ok(rate) => {
                    warn!(
                        "{} returned invalid rate {} for {}/{}, trying next source",
                        provider.name(),
                        rate,
                        from,
                        to
                    );
                }
                Err(e) => {
                    warn!(
                        "{} failed for {}/{}: {}, trying next source",
                        provider.name(),
                        from,
                        to,
                        e
                    );
                }
            }
        }

        match self.get_cached_rate(&from, &to).await {
            Ok(Some(cached)) if cached.rate > 0.0 => {
                info!("Using cached rate for {}/{}: {}", from, to, cached.rate);
                return Ok(RateQuote {
                    from,
                    to,
                    rate: cached.rate,
                    source: CACHE_SOURCE.to_string(),
                });
            }
            Ok(_) => debug!("No cached rate for {}/{}", from, to),
            Err(e) => warn!("Cached rate lookup for {}/{} failed: {}", from, to, e),
        }

        if let Some(rate) = self.hardcoded_rate(&from, &to) {
            warn!("Using hardcoded fallback rate for {}/{}: {}", from, to, rate);
            return Ok(RateQuote {
                from,
                to,
                rate,
                source: HARDCODED_SOURCE.to_string(),
            });
        }

        error!("No exchange rate available for {}/{}", from, to);
        Err(RateError::NoRateAvailable { from, to })
    }

    /// Most recent persisted rate. Stale rates are returned and logged.
    pub async fn get_cached_rate(&self, from: &str, to: &str) -> Result<Option<CachedRate>, RateError> {
        let Some(store) = &self.store else {
            return Ok(None);
        };

        let cached = store
            .latest_rate(&normalize(from), &normalize(to))
            .await
            .map_err(|e: StoreError| RateError::Provider {
                provider: CACHE_SOURCE.to_string(),
                reason: e.to_string(),
            })?;

        if let Some(rate) = &cached {
            let age = Utc::now() - rate.fetched_at;
            if age > self.max_age {
                warn!(
                    "Cached rate {}/{} is stale: {}h old (max {}h)",
                    rate.from_currency,
                    rate.to_currency,
                    age.num_hours(),
                    self.max_age.num_hours()
                );
            }
        }

        Ok(cached)
    }

    fn hardcoded_rate(&self, from: &str, to: &str) -> Option<f64> {
        if let Some(rate) = self.fallback_rates.get(&(from.to_string(), to.to_string())) {
            return Some(*rate);
        }
        // Inverse lookups against the base currency only; cross pairs are not derived
        if from == self.fallback_base {
            return self
                .fallback_rates
                .get(&(to.to_string(), from.to_string()))
                .map(|rate| 1.0 / rate);
        }
        None
    }

    async fn persist(&self, quote: &RateQuote) {
        let Some(store) = &self.store else {
            return;
        };

        let record = CachedRate {
            from_currency: quote.from.clone(),
            to_currency: quote.to.clone(),
            rate: quote.rate,
            source: quote.source.clone(),
            fetched_at: Utc::now(),
        };
        if let Err(e) = store.save_rate(&record).await {
            warn!("Failed to cache rate {}/{}: {}", quote.from, quote.to, e);
        }
    }

    /// Refresh every ordered pair of the sync currency set.
    ///
    /// Partial failure is fine; an error is returned only when no pair could
    /// be resolved at all.
    pub async fn sync_rates(&self) -> Result<SyncReport, RateError> {
        let mut report = SyncReport::default();

        for from in &self.sync_currencies {
            for to in &self.sync_currencies {
                if from == to {
                    continue;
                }
                report.attempted += 1;
                match self.resolve(from, to).await {
                    Ok(quote) => report.succeeded.push(quote),
                    Err(e) => {
                        warn!("Rate sync failed for {}/{}: {}", from, to, e);
                        report.failed.push((from.clone(), to.clone(), e.to_string()));
                    }
                }
            }
        }

        if report.attempted > 0 && report.succeeded.is_empty() {
            error!("Rate sync failed for all {} pairs", report.attempted);
            return Err(RateError::SyncFailed {
                attempted: report.attempted,
            });
        }

        info!(
            "Rate sync complete: {}/{} pairs updated",
            report.success_count(),
            report.attempted
        );
        Ok(report)
    }
}

impl Default for ExchangeRateCacheService {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(currency: &str) -> String {
    currency.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StaticProvider {
        name: &'static str,
        result: Result<f64, RateError>,
        calls: AtomicUsize,
    }

    impl StaticProvider {
        fn ok(name: &'static str, rate: f64) -> Arc<Self> {
            Arc::new(Self {
                name,
                result: Ok(rate),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                result: Err(RateError::Provider {
                    provider: name.to_string(),
                    reason: "timeout".to_string(),
                }),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RateProvider for StaticProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch_rate(&self, _from: &str, _to: &str) -> Result<f64, RateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    #[derive(Default)]
    struct MemoryRateStore {
        rates: Mutex<Vec<CachedRate>>,
        fail_writes: bool,
    }

    #[async_trait]
    impl RateStore for MemoryRateStore {
        async fn save_rate(&self, rate: &CachedRate) -> Result<(), StoreError> {
            if self.fail_writes {
                return Err(StoreError::Unavailable("disk full".to_string()));
            }
            self.rates.lock().unwrap().push(rate.clone());
            Ok(())
        }

        async fn latest_rate(&self, from: &str, to: &str) -> Result<Option<CachedRate>, StoreError> {
            Ok(self
                .rates
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.from_currency == from && r.to_currency == to)
                .max_by_key(|r| r.fetched_at)
                .cloned())
        }
    }

    #[tokio::test]
    async fn test_same_currency_short_circuits() {
        let primary = StaticProvider::ok("exchangerate-api", 1.1);
        let cache = ExchangeRateCacheService::new().with_primary_api(primary.clone());

        assert_eq!(cache.get_rate("usd", "USD").await.unwrap(), 1.0);
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn test_primary_tier_wins_and_is_persisted() {
        let primary = StaticProvider::ok("exchangerate-api", 1.08);
        let broker = StaticProvider::ok("broker", 1.5);
        let store = Arc::new(MemoryRateStore::default());
        let cache = ExchangeRateCacheService::new()
            .with_primary_api(primary.clone())
            .with_broker_fx(broker.clone())
            .with_store(store.clone());

        let quote = cache.resolve("EUR", "USD").await.unwrap();
        assert_eq!(quote.rate, 1.08);
        assert_eq!(quote.source, "exchangerate-api");
        assert_eq!(broker.calls(), 0);

        let saved = store.latest_rate("EUR", "USD").await.unwrap().unwrap();
        assert_eq!(saved.rate, 1.08);
        assert_eq!(saved.source, "exchangerate-api");
    }

    #[tokio::test]
    async fn test_falls_through_to_market_data() {
        let primary = StaticProvider::failing("exchangerate-api");
        let broker = StaticProvider::ok("broker", 0.0);
        let market = StaticProvider::ok("yahoo", 1.09);
        let cache = ExchangeRateCacheService::new()
            .with_primary_api(primary.clone())
            .with_broker_fx(broker.clone())
            .with_market_data(market.clone());

        let quote = cache.resolve("EUR", "USD").await.unwrap();
        assert_eq!(quote.rate, 1.09);
        assert_eq!(quote.source, "yahoo");
        assert_eq!(primary.calls(), 1);
        assert_eq!(broker.calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_cached_rate_is_still_used() {
        let store = Arc::new(MemoryRateStore::default());
        store
            .save_rate(&CachedRate {
                from_currency: "EUR".to_string(),
                to_currency: "GBP".to_string(),
                rate: 0.86,
                source: "exchangerate-api".to_string(),
                fetched_at: Utc::now() - Duration::hours(100),
            })
            .await
            .unwrap();

        let cache = ExchangeRateCacheService::new()
            .with_primary_api(StaticProvider::failing("exchangerate-api"))
            .with_store(store.clone());

        let quote = cache.resolve("EUR", "GBP").await.unwrap();
        assert_eq!(quote.rate, 0.86);
        assert_eq!(quote.source, CACHE_SOURCE);
        // cache hits are not written back
        assert_eq!(store.rates.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_hardcoded_fallback() {
        let cache = ExchangeRateCacheService::new()
            .with_primary_api(StaticProvider::failing("exchangerate-api"));

        let quote = cache.resolve("USD", "EUR").await.unwrap();
        assert_eq!(quote.rate, 0.9);
        assert_eq!(quote.source, HARDCODED_SOURCE);

        let inverse = cache.get_rate("EUR", "HKD").await.unwrap();
        assert!((inverse - 1.0 / 0.11).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_no_rate_available() {
        let cache = ExchangeRateCacheService::new();
        assert_eq!(
            cache.get_rate("GBP", "HKD").await,
            Err(RateError::NoRateAvailable {
                from: "GBP".to_string(),
                to: "HKD".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_cache_write_failure_does_not_fail_lookup() {
        let store = Arc::new(MemoryRateStore {
            rates: Mutex::new(Vec::new()),
            fail_writes: true,
        });
        let cache = ExchangeRateCacheService::new()
            .with_primary_api(StaticProvider::ok("exchangerate-api", 1.1))
            .with_store(store);

        assert_eq!(cache.get_rate("EUR", "USD").await.unwrap(), 1.1);
    }

    #[tokio::test]
    async fn test_sync_rates_partial_failure_is_ok() {
        let cache = ExchangeRateCacheService::new()
            .with_primary_api(StaticProvider::failing("exchangerate-api"))
            .with_sync_currencies(vec!["EUR".to_string(), "USD".to_string(), "JPY".to_string()]);

        let report = cache.sync_rates().await.unwrap();
        assert_eq!(report.attempted, 6);
        // only the hardcoded USD/EUR pair and its inverse resolve
        assert_eq!(report.success_count(), 2);
        assert_eq!(report.failed.len(), 4);
    }

    #[tokio::test]
    async fn test_sync_currencies_deduplicated_in_order() {
        let cache = ExchangeRateCacheService::new()
            .with_primary_api(StaticProvider::failing("exchangerate-api"))
            .with_sync_currencies(vec!["EUR".to_string(), "usd".to_string(), " eur".to_string()]);

        let report = cache.sync_rates().await.unwrap();
        assert_eq!(report.attempted, 2);
        assert_eq!(report.success_count(), 2);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_sync_rates_all_failed() {
        let cache = ExchangeRateCacheService::new()
            .with_primary_api(StaticProvider::failing("exchangerate-api"))
            .with_sync_currencies(vec!["JPY".to_string(), "CHF".to_string()]);

        assert_eq!(
            cache.sync_rates().await,
            Err(RateError::SyncFailed { attempted: 2 })
        );
    }

    #[tokio::test]
    async fn test_sync_rates_persists_live_results() {
        let store = Arc::new(MemoryRateStore::default());
        let cache = ExchangeRateCacheService::new()
            .with_primary_api(StaticProvider::ok("exchangerate-api", 1.5))
            .with_store(store.clone());

        let report = cache.sync_rates().await.unwrap();
        assert_eq!(report.attempted, 12);
        assert_eq!(report.success_count(), 12);
        assert_eq!(store.rates.lock().unwrap().len(), 12);
    }

    #[test]
    fn test_fallback_chain_order() {
        let cache = ExchangeRateCacheService::new()
            .with_primary_api(StaticProvider::ok("exchangerate-api", 1.0))
            .with_broker_fx(StaticProvider::ok("broker", 1.0))
            .with_market_data(StaticProvider::ok("yahoo", 1.0));

        let chain = cache.fallback_chain();
        let sources: Vec<&str> = chain.iter().map(|t| t.source.as_str()).collect();
        assert_eq!(sources, vec!["exchangerate-api", "broker", "yahoo", "cache", "hardcoded"]);
        assert_eq!(chain[0].condition, "always_try_first");
        assert_eq!(chain[4].condition, "if_all_else_fails");
        assert_eq!(chain[4].order, 5);
    }
}
