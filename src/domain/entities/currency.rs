//! Currency-pair graph used for FX routing
//!
//! The graph is a star: one hub currency and a set of leaf currencies, each
//! connected to the hub by a dedicated FX instrument. There are no
//! leaf-to-leaf edges, so any two currencies in the graph are at most two
//! hops apart.

use serde::{Deserialize, Serialize};

use super::trade::TradeSide;

/// One leg of a currency conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStep {
    pub symbol: String,
    pub action: TradeSide,
    pub from_currency: String,
    pub to_currency: String,
}

/// A hub <-> leaf edge backed by a tradeable FX instrument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectPair {
    pub leaf: String,
    pub symbol: String,
    /// Order side that converts hub currency into the leaf currency
    pub hub_to_leaf: TradeSide,
}

impl DirectPair {
    pub fn new(leaf: &str, symbol: &str, hub_to_leaf: TradeSide) -> Self {
        Self {
            leaf: leaf.to_string(),
            symbol: symbol.to_string(),
            hub_to_leaf,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyGraph {
    hub: String,
    pairs: Vec<DirectPair>,
}

impl CurrencyGraph {
    /// Build a graph, rejecting self-edges and duplicate leaves.
    /// Currency codes are trimmed and uppercased.
    pub fn new(hub: &str, pairs: Vec<DirectPair>) -> Result<Self, String> {
        let hub = hub.trim().to_uppercase();
        if hub.is_empty() {
            return Err("Hub currency cannot be empty".to_string());
        }

        let pairs: Vec<DirectPair> = pairs
            .into_iter()
            .map(|pair| DirectPair {
                leaf: pair.leaf.trim().to_uppercase(),
                ..pair
            })
            .collect();

        let mut seen: Vec<&str> = Vec::with_capacity(pairs.len());
        for pair in &pairs {
            if pair.leaf == hub {
                return Err(format!("Direct pair {} connects hub {} to itself", pair.symbol, hub));
            }
            if seen.contains(&pair.leaf.as_str()) {
                return Err(format!("Duplicate direct pair for currency {}", pair.leaf));
            }
            seen.push(&pair.leaf);
        }

        Ok(Self { hub, pairs })
    }

    /// EUR-hub graph with the broker's tradeable FX instruments
    pub fn eur_hub() -> Self {
        Self {
            hub: "EUR".to_string(),
            pairs: vec![
                DirectPair::new("USD", "EURUSD_T0.ITS", TradeSide::Sell),
                DirectPair::new("GBP", "EURGBP_T0.ITS", TradeSide::Sell),
                DirectPair::new("HKD", "HKD/EUR", TradeSide::Buy),
            ],
        }
    }

    pub fn hub(&self) -> &str {
        &self.hub
    }

    pub fn contains(&self, currency: &str) -> bool {
        currency == self.hub || self.pair_for(currency).is_some()
    }

    /// Every node of the graph, hub first
    pub fn currencies(&self) -> Vec<String> {
        std::iter::once(self.hub.clone())
            .chain(self.pairs.iter().map(|p| p.leaf.clone()))
            .collect()
    }

    fn pair_for(&self, leaf: &str) -> Option<&DirectPair> {
        self.pairs.iter().find(|p| p.leaf == leaf)
    }

    /// The single step between two adjacent currencies, if they share an edge
    pub fn direct_step(&self, from: &str, to: &str) -> Option<ConversionStep> {
        if from == self.hub {
            let pair = self.pair_for(to)?;
            return Some(ConversionStep {
                symbol: pair.symbol.clone(),
                action: pair.hub_to_leaf,
                from_currency: from.to_string(),
                to_currency: to.to_string(),
            });
        }
        if to == self.hub {
            let pair = self.pair_for(from)?;
            return Some(ConversionStep {
                symbol: pair.symbol.clone(),
                action: pair.hub_to_leaf.opposite(),
                from_currency: from.to_string(),
                to_currency: to.to_string(),
            });
        }
        None
    }
}

impl Default for CurrencyGraph {
    fn default() -> Self {
        Self::eur_hub()
    }
}
