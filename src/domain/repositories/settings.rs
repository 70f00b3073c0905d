use crate::domain::errors::ConfigSourceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Transaction cost settings used for commission estimates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommissionSettings {
    /// Fixed fee per trade, denominated in the hub currency
    pub fixed: f64,
    /// Variable fee as a fraction of trade value (0.002 = 0.2%)
    pub percent: f64,
}

impl Default for CommissionSettings {
    fn default() -> Self {
        Self {
            fixed: 2.0,
            percent: 0.002,
        }
    }
}

#[async_trait]
pub trait CommissionConfigSource: Send + Sync {
    async fn get_default_config(&self) -> Result<CommissionSettings, ConfigSourceError>;
}
