//! Session-table market hours
//!
//! Conservative core trading windows per exchange code, expressed in UTC
//! against standard time. Weekends are closed. Daylight saving and exchange
//! holidays are not modelled.

use crate::domain::repositories::MarketHoursOracle;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc, Weekday};
use std::collections::HashMap;
use tracing::debug;

/// One trading period within a day, UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingWindow {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl TradingWindow {
    /// Window from `(hour, minute)` pairs. Returns `None` for an invalid time.
    pub fn new(open: (u32, u32), close: (u32, u32)) -> Option<Self> {
        Some(Self {
            open: NaiveTime::from_hms_opt(open.0, open.1, 0)?,
            close: NaiveTime::from_hms_opt(close.0, close.1, 0)?,
        })
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        time >= self.open && time < self.close
    }
}

pub struct SessionTableMarketHours {
    sessions: HashMap<String, Vec<TradingWindow>>,
    /// Session used for codes missing from the table
    fallback_code: String,
}

impl SessionTableMarketHours {
    pub fn new(fallback_code: &str) -> Self {
        Self {
            sessions: HashMap::new(),
            fallback_code: fallback_code.to_uppercase(),
        }
    }

    /// Register `windows` under every code in `codes`
    pub fn with_session(mut self, codes: &[&str], windows: Vec<TradingWindow>) -> Self {
        for code in codes {
            self.sessions.insert(code.to_uppercase(), windows.clone());
        }
        self
    }

    fn windows(&self, exchange_code: &str) -> &[TradingWindow] {
        let code = exchange_code.to_uppercase();
        self.sessions
            .get(&code)
            .or_else(|| {
                debug!("No session for exchange {}, using {}", code, self.fallback_code);
                self.sessions.get(&self.fallback_code)
            })
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_open_at(&self, exchange_code: &str, at: DateTime<Utc>) -> bool {
        if matches!(at.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }

        let Some(time) = NaiveTime::from_hms_opt(at.hour(), at.minute(), at.second()) else {
            return false;
        };
        self.windows(exchange_code)
            .iter()
            .any(|window| window.contains(time))
    }
}

impl Default for SessionTableMarketHours {
    fn default() -> Self {
        let window = |open, close| TradingWindow::new(open, close).into_iter().collect::<Vec<_>>();

        let hong_kong: Vec<TradingWindow> = [((1, 30), (4, 0)), ((5, 0), (8, 0))]
            .into_iter()
            .filter_map(|(open, close)| TradingWindow::new(open, close))
            .collect();

        Self::new("US")
            // NYSE / NASDAQ 10:00-15:00 ET
            .with_session(&["US", "NYSE", "NASDAQ"], window((15, 0), (20, 0)))
            // TSX 10:00-15:00 ET
            .with_session(&["TO", "TSX"], window((15, 0), (20, 0)))
            // LSE 10:00-15:00 GMT
            .with_session(&["L", "UK", "LSE"], window((10, 0), (15, 0)))
            // XETRA and Euronext 10:00-16:00 CET
            .with_session(
                &["DE", "XETRA", "F", "PA", "AS", "BR", "MI", "EU"],
                window((9, 0), (15, 0)),
            )
            // HKEX 09:30-12:00 and 13:00-16:00 HKT
            .with_session(&["HK", "HKSE"], hong_kong)
    }
}

#[async_trait]
impl MarketHoursOracle for SessionTableMarketHours {
    async fn is_market_open(&self, exchange_code: &str, at: DateTime<Utc>) -> bool {
        self.is_open_at(exchange_code, at)
    }
}
