//! Primary exchange-rate API client (open.er-api.com format)
//!
//! `GET {base_url}/{FROM}` returns every rate against `FROM`:
//! `{"result": "success", "base_code": "EUR", "rates": {"USD": 1.08, ...}}`

use crate::domain::errors::RateError;
use crate::domain::repositories::RateProvider;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

pub const EXCHANGE_RATE_API_NAME: &str = "exchangerate-api";
pub const DEFAULT_EXCHANGE_RATE_API_URL: &str = "https://open.er-api.com/v6/latest";

#[derive(Debug, Deserialize)]
pub struct LatestRatesResponse {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub base_code: Option<String>,
    #[serde(default)]
    pub rates: HashMap<String, f64>,
    #[serde(rename = "error-type", default)]
    pub error_type: Option<String>,
}

pub struct ExchangeRateApiClient {
    client: Client,
    base_url: String,
}

impl ExchangeRateApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn provider_error(reason: String) -> RateError {
        RateError::Provider {
            provider: EXCHANGE_RATE_API_NAME.to_string(),
            reason,
        }
    }

    /// Pick `to` out of a latest-rates response
    pub fn extract_rate(response: &LatestRatesResponse, to: &str) -> Result<f64, RateError> {
        if let Some(result) = &response.result {
            if result != "success" {
                let detail = response.error_type.as_deref().unwrap_or("unknown error");
                return Err(Self::provider_error(format!("API returned {}: {}", result, detail)));
            }
        }

        let rate = response
            .rates
            .get(to)
            .copied()
            .ok_or_else(|| Self::provider_error(format!("No rate for {} in response", to)))?;

        if !rate.is_finite() || rate <= 0.0 {
            return Err(RateError::InvalidRate {
                provider: EXCHANGE_RATE_API_NAME.to_string(),
                rate,
            });
        }
        Ok(rate)
    }
}

#[async_trait]
impl RateProvider for ExchangeRateApiClient {
    fn name(&self) -> &str {
        EXCHANGE_RATE_API_NAME
    }

    async fn fetch_rate(&self, from: &str, to: &str) -> Result<f64, RateError> {
        let url = format!("{}/{}", self.base_url, from.to_uppercase());

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::provider_error(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Self::provider_error(format!("HTTP {} - {}", status, error_text)));
        }

        let body: LatestRatesResponse = response
            .json()
            .await
            .map_err(|e| Self::provider_error(format!("Failed to parse response: {}", e)))?;

        let rate = Self::extract_rate(&body, &to.to_uppercase())?;
        debug!("{}: {}/{} = {}", EXCHANGE_RATE_API_NAME, from, to, rate);
        Ok(rate)
    }
}
