//! Market snapshot types.

use serde::{Deserialize, Serialize};

/// A coin's latest market snapshot.
///
/// Immutable once fetched; a refresh produces a new snapshot rather than
/// mutating the cached one. Field names match the upstream `/coins/markets`
/// payload so snapshots round-trip through the cache and the HTTP surface
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    pub market_cap: f64,
    pub total_volume: f64,
    pub price_change_percentage_24h: f64,
}

impl MarketSnapshot {
    /// Whether `identifier` names this coin by id or ticker symbol, ignoring case.
    pub fn matches(&self, identifier: &str) -> bool {
        self.id.eq_ignore_ascii_case(identifier) || self.symbol.eq_ignore_ascii_case(identifier)
    }

    /// Price context handed to the sentiment service.
    pub fn price_context(&self) -> PriceContext {
        PriceContext {
            price_change_24h: self.price_change_percentage_24h,
        }
    }
}

/// Observed price movement used to sanity-check classifier output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceContext {
    /// 24h price change in percent.
    pub price_change_24h: f64,
}
