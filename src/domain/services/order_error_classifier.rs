//! Classification of broker order errors
//!
//! Broker error messages are free text. Detecting a market-hours rejection
//! is a keyword match, kept behind a trait so a structured broker error code
//! can replace it.

/// Decides whether a failed order should be queued for a later retry
pub trait OrderErrorClassifier: Send + Sync {
    fn is_market_hours_error(&self, message: &str) -> bool;
}

pub const MARKET_HOURS_PHRASES: &[&str] = &[
    "market closed",
    "market is closed",
    "trading hours",
    "outside trading hours",
    "market not open",
    "exchange closed",
    "trading session closed",
    "after hours",
    "pre-market",
];

/// Case-insensitive substring match against a phrase list
#[derive(Debug, Clone)]
pub struct PhraseClassifier {
    phrases: Vec<String>,
}

impl PhraseClassifier {
    pub fn new(phrases: &[&str]) -> Self {
        Self {
            phrases: phrases.iter().map(|p| p.to_lowercase()).collect(),
        }
    }
}

impl Default for PhraseClassifier {
    fn default() -> Self {
        Self::new(MARKET_HOURS_PHRASES)
    }
}

impl OrderErrorClassifier for PhraseClassifier {
    fn is_market_hours_error(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.phrases.iter().any(|phrase| message.contains(phrase.as_str()))
    }
}
