use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Per-symbol cooldown between trades
pub struct TradeFrequencyGuard {
    cooldown: Duration,
    last_trade: Mutex<HashMap<String, Instant>>,
}

impl TradeFrequencyGuard {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_trade: Mutex::new(HashMap::new()),
        }
    }

    /// Time left before `symbol` may trade again, `None` when it may trade now
    pub async fn remaining(&self, symbol: &str) -> Option<Duration> {
        let last_trade = self.last_trade.lock().await;
        let elapsed = last_trade.get(symbol)?.elapsed();
        if elapsed < self.cooldown {
            Some(self.cooldown - elapsed)
        } else {
            None
        }
    }

    pub async fn record(&self, symbol: &str) {
        self.last_trade
            .lock()
            .await
            .insert(symbol.to_string(), Instant::now());
    }
}

impl Default for TradeFrequencyGuard {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}
