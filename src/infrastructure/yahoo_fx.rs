//! Market-data quotes from the Yahoo Finance chart endpoint
//!
//! `GET {base_url}/{TICKER}` returns the last price in
//! `chart.result[0].meta.regularMarketPrice`. FX pairs use `{FROM}{TO}=X`
//! tickers; securities use the broker symbol with US suffixes dropped.

use crate::domain::errors::RateError;
use crate::domain::repositories::{RateProvider, ReferencePriceSource};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const YAHOO_PROVIDER_NAME: &str = "yahoo";
pub const DEFAULT_YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

#[derive(Debug, Deserialize)]
pub struct ChartResponse {
    pub chart: Chart,
}

#[derive(Debug, Deserialize)]
pub struct Chart {
    #[serde(default)]
    pub result: Option<Vec<ChartResult>>,
    #[serde(default)]
    pub error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
pub struct ChartResult {
    pub meta: ChartMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMeta {
    #[serde(default)]
    pub regular_market_price: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChartError {
    pub code: String,
    #[serde(default)]
    pub description: String,
}

pub struct YahooFxClient {
    client: Client,
    base_url: String,
}

impl YahooFxClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(timeout)
            // The chart endpoint rejects requests without a user agent
            .user_agent("Mozilla/5.0 (compatible; fxguard)")
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Yahoo ticker for an FX pair, e.g. `EURUSD=X`
    pub fn pair_ticker(from: &str, to: &str) -> String {
        format!("{}{}=X", from.to_uppercase(), to.to_uppercase())
    }

    /// Yahoo ticker for a broker symbol: `AAPL.US` -> `AAPL`, others unchanged
    pub fn security_ticker(symbol: &str) -> &str {
        symbol.strip_suffix(".US").unwrap_or(symbol)
    }

    fn provider_error(reason: String) -> RateError {
        RateError::Provider {
            provider: YAHOO_PROVIDER_NAME.to_string(),
            reason,
        }
    }

    async fn fetch_price(&self, ticker: &str) -> Result<f64, RateError> {
        let url = format!("{}/{}", self.base_url, ticker);

        let response = self
            .client
            .get(&url)
            .query(&[("interval", "1d"), ("range", "1d")])
            .send()
            .await
            .map_err(|e| Self::provider_error(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Self::provider_error(format!("HTTP {} - {}", status, error_text)));
        }

        let body: ChartResponse = response
            .json()
            .await
            .map_err(|e| Self::provider_error(format!("Failed to parse response: {}", e)))?;

        Self::extract_price(&body)
    }

    pub fn extract_price(response: &ChartResponse) -> Result<f64, RateError> {
        if let Some(error) = &response.chart.error {
            return Err(Self::provider_error(format!(
                "{}: {}",
                error.code, error.description
            )));
        }

        let price = response
            .chart
            .result
            .as_ref()
            .and_then(|results| results.first())
            .and_then(|result| result.meta.regular_market_price)
            .ok_or_else(|| Self::provider_error("No price in chart response".to_string()))?;

        if !price.is_finite() || price <= 0.0 {
            return Err(RateError::InvalidRate {
                provider: YAHOO_PROVIDER_NAME.to_string(),
                rate: price,
            });
        }
        Ok(price)
    }
}

#[async_trait]
impl RateProvider for YahooFxClient {
    fn name(&self) -> &str {
        YAHOO_PROVIDER_NAME
    }

    async fn fetch_rate(&self, from: &str, to: &str) -> Result<f64, RateError> {
        let rate = self.fetch_price(&Self::pair_ticker(from, to)).await?;
        debug!("{}: {}/{} = {}", YAHOO_PROVIDER_NAME, from, to, rate);
        Ok(rate)
    }
}

#[async_trait]
impl ReferencePriceSource for YahooFxClient {
    async fn current_price(&self, symbol: &str) -> Result<f64, RateError> {
        let price = self.fetch_price(Self::security_ticker(symbol)).await?;
        debug!("{}: {} = {}", YAHOO_PROVIDER_NAME, symbol, price);
        Ok(price)
    }
}
