//! Execution outcome of a single recommendation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::trade::TradeSide;

/// Terminal state of a recommendation in the execution pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Order placed at the broker
    Success,
    /// Rejected by a validation for an expected reason
    Blocked,
    /// Malformed input or unexpected failure
    Error,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Success => write!(f, "success"),
            ExecutionStatus::Blocked => write!(f, "blocked"),
            ExecutionStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub symbol: String,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecuteResult {
    pub fn success(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            status: ExecutionStatus::Success,
            error: None,
        }
    }

    pub fn blocked(symbol: &str, error: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            status: ExecutionStatus::Blocked,
            error: Some(error.into()),
        }
    }

    pub fn error(symbol: &str, error: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            status: ExecutionStatus::Error,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// Notifications published after the pipeline records a trade
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    TradeExecuted {
        symbol: String,
        side: TradeSide,
        quantity: f64,
        price: f64,
        order_id: String,
        source: String,
        executed_at: DateTime<Utc>,
    },
}
