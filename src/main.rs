use fxguard::config::ExecutionConfig;
use fxguard::domain::entities::currency::CurrencyGraph;
use fxguard::domain::entities::execution::{ExecutionEvent, ExecutionStatus};
use fxguard::domain::entities::trade::TradeRecommendation;
use fxguard::domain::repositories::CashLedger;
use fxguard::domain::services::currency_exchange::{BrokerFxRateProvider, CurrencyExchangeService};
use fxguard::domain::services::exchange_rate_cache::ExchangeRateCacheService;
use fxguard::domain::services::trade_execution::TradeExecutionService;
use fxguard::infrastructure::exchange_rate_api::ExchangeRateApiClient;
use fxguard::infrastructure::market_hours::SessionTableMarketHours;
use fxguard::infrastructure::paper_broker::PaperBroker;
use fxguard::infrastructure::yahoo_fx::YahooFxClient;
use fxguard::persistence::cash_ledger::SqliteCashLedger;
use fxguard::persistence::repository::{
    DismissedFilterRepository, ExchangeRateRepository, PriceHistoryRepository, SettingsRepository,
    TradeRepository,
};
use fxguard::persistence::{init_database_with_config, DatabaseConfig};
use fxguard::task_runner::{run_with_circuit_breaker, CircuitBreakerConfig};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fxguard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("fxguard starting (paper mode)");

    let config = ExecutionConfig::from_env();
    let pool = init_database_with_config(&DatabaseConfig::from_env()).await?;

    let graph = CurrencyGraph::eur_hub();
    if graph.hub() != config.hub_currency {
        return Err(format!(
            "Hub currency {} is not supported by the currency graph (hub {})",
            config.hub_currency,
            graph.hub()
        )
        .into());
    }

    // Live rate tiers
    let rate_store = Arc::new(ExchangeRateRepository::new(pool.clone()));
    let rate_api = Arc::new(ExchangeRateApiClient::new(&config.rate_api_url, config.http_timeout())?);
    let market_data = Arc::new(YahooFxClient::new(&config.market_data_url, config.http_timeout())?);

    let base_cache = || {
        ExchangeRateCacheService::new()
            .with_primary_api(rate_api.clone())
            .with_market_data(market_data.clone())
            .with_store(rate_store.clone())
            .with_max_age_hours(config.rate_max_age_hours)
            .with_sync_currencies(config.sync_currencies.clone())
    };

    let recommendations = match &config.recommendations_file {
        Some(path) => match load_recommendations(path) {
            Ok(recommendations) => {
                info!("Loaded {} recommendations from {}", recommendations.len(), path);
                recommendations
            }
            Err(e) => {
                error!("Failed to load recommendations from {}: {}", path, e);
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    // The paper broker quotes securities at their estimated prices and FX
    // at the rates the cache resolves at startup
    let seed_cache = base_cache();
    let mut paper_broker = PaperBroker::new();
    for rec in &recommendations {
        paper_broker = paper_broker.with_quote(&rec.symbol, rec.estimated_price);
    }
    for leaf in graph.currencies().iter().filter(|c| *c != graph.hub()) {
        match seed_cache.resolve(graph.hub(), leaf).await {
            Ok(quote) => {
                info!(
                    "Paper FX {}/{} = {:.4} (source: {})",
                    quote.from, quote.to, quote.rate, quote.source
                );
                paper_broker = paper_broker.with_fx_rate(&quote.from, &quote.to, quote.rate);
            }
            Err(e) => warn!("No paper FX rate for {}/{}: {}", graph.hub(), leaf, e),
        }
    }
    let broker = Arc::new(paper_broker);

    let ledger = Arc::new(SqliteCashLedger::new(pool.clone()));
    if ledger.balances().await?.is_empty() && config.paper_starting_balance > 0.0 {
        ledger
            .deposit(&config.hub_currency, config.paper_starting_balance)
            .await?;
    }

    let exchange = Arc::new(
        CurrencyExchangeService::new(graph, broker.clone(), broker.clone(), ledger.clone())
            .with_fee_buffer(config.conversion_fee_buffer),
    );

    let rate_cache = Arc::new(
        base_cache().with_broker_fx(Arc::new(BrokerFxRateProvider::new(exchange.clone()))),
    );
    let tiers: Vec<String> = rate_cache
        .fallback_chain()
        .into_iter()
        .map(|tier| tier.source)
        .collect();
    info!("Rate fallback chain: {}", tiers.join(" -> "));

    let (event_sender, _) = broadcast::channel(256);
    let pipeline = TradeExecutionService::new(
        broker.clone(),
        exchange.clone(),
        Arc::new(TradeRepository::new(pool.clone())),
        config.execution_settings("paper"),
    )
    .with_market_hours(Arc::new(SessionTableMarketHours::default()))
    .with_dismissed_filters(Arc::new(DismissedFilterRepository::new(pool.clone())))
    .with_price_history(Arc::new(PriceHistoryRepository::new(pool.clone())))
    .with_reference_prices(market_data.clone())
    .with_commission_source(Arc::new(SettingsRepository::new(
        pool.clone(),
        config.commission_defaults(),
    )))
    .with_event_sender(event_sender);

    // Log execution events
    let event_task = pipeline.subscribe().map(|mut events| {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ExecutionEvent::TradeExecuted {
                        symbol,
                        side,
                        quantity,
                        price,
                        order_id,
                        ..
                    }) => info!(
                        "Trade executed: {} {} {} @ {:.4} (order {})",
                        side, quantity, symbol, price, order_id
                    ),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Event logger lagged, skipped {} events", skipped)
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    });

    // Periodic rate sync
    let sync_cache = rate_cache.clone();
    let sync_config = CircuitBreakerConfig::periodic(config.rate_sync_interval());
    let sync_task = tokio::spawn(async move {
        run_with_circuit_breaker(
            "rate_sync",
            sync_config,
            move || {
                let cache = sync_cache.clone();
                async move {
                    let report = cache.sync_rates().await.map_err(|e| e.to_string())?;
                    info!(
                        "Rate sync: {}/{} pairs updated",
                        report.success_count(),
                        report.attempted
                    );
                    Ok::<(), String>(())
                }
            },
        )
        .await;
    });

    if !recommendations.is_empty() {
        info!("Executing {} recommendations", recommendations.len());
        let results = pipeline.execute_trades(&recommendations).await;
        for result in &results {
            match result.status {
                ExecutionStatus::Success => info!("{}: {}", result.symbol, result.status),
                _ => warn!(
                    "{}: {} - {}",
                    result.symbol,
                    result.status,
                    result.error.as_deref().unwrap_or_default()
                ),
            }
        }
        let balances = ledger.balances().await?;
        info!("Balances after execution: {:?}", balances);
    }

    info!("Running. Press Ctrl+C to stop.");
    shutdown_signal().await;

    info!("Shutting down gracefully...");
    sync_task.abort();
    drop(pipeline);
    if let Some(handle) = event_task {
        let _ = handle.await;
    }
    pool.close().await;

    info!("Shutdown complete");
    Ok(())
}

fn load_recommendations(path: &str) -> Result<Vec<TradeRecommendation>, String> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read file: {}", e))?;
    serde_json::from_str(&contents).map_err(|e| format!("Invalid recommendations JSON: {}", e))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal"),
            Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
