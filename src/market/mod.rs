//! Market data gateway.
//!
//! [`MarketGateway`] fronts a [`MarketProvider`] (normally
//! [`CoinGeckoClient`]) with the shared cache and a process-local
//! politeness interval. Its public calls never fail: an empty result (or
//! `None` for a single coin) is the uniform "no data" signal.
//!
//! # Lookup tiers
//!
//! ```text
//!   get_market_data(currency, limit)
//!           │
//!           ▼
//!   fresh cache entry? ──yes──► return it (no network)
//!           │ no / stale
//!           ▼
//!   wait politeness interval, fetch upstream ──ok──► cache + return
//!           │ throttled / failed
//!           ▼
//!   any retained entry (even expired)? ──yes──► return it
//!           │ no
//!           ▼
//!        return []
//! ```

mod coingecko;
pub mod politeness;

pub use coingecko::{CoinGeckoClient, DEFAULT_BASE_URL};
pub use politeness::Politeness;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::cache::{Cache, CacheKey, Cached, Lookup};
use crate::types::MarketSnapshot;
use crate::{KvasirError, Result};

/// Upstream source of market snapshots.
#[async_trait]
pub trait MarketProvider: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Top `limit` coins by market cap, descending.
    async fn fetch_markets(&self, currency: &str, limit: usize) -> Result<Vec<MarketSnapshot>>;

    /// A single coin by upstream id, priced in `currency`. `Ok(None)` if the
    /// upstream has no such coin.
    async fn fetch_coin(&self, currency: &str, id: &str) -> Result<Option<MarketSnapshot>>;
}

/// Configuration for [`MarketGateway`].
#[derive(Debug, Clone)]
pub struct MarketGatewayConfig {
    /// Quote currency for snapshots. Default: "usd".
    pub currency: String,
    /// Snapshot size served by the market listing. Default: 100.
    pub default_limit: usize,
    /// Snapshot size consulted when resolving a coin by name. Default: 100.
    pub coin_lookup_depth: usize,
    /// Minimum spacing between upstream calls. Default: 2s.
    pub politeness_interval: Duration,
}

impl Default for MarketGatewayConfig {
    fn default() -> Self {
        Self {
            currency: "usd".to_string(),
            default_limit: 100,
            coin_lookup_depth: 100,
            politeness_interval: politeness::DEFAULT_INTERVAL,
        }
    }
}

impl MarketGatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn coin_lookup_depth(mut self, depth: usize) -> Self {
        self.coin_lookup_depth = depth;
        self
    }

    pub fn politeness_interval(mut self, interval: Duration) -> Self {
        self.politeness_interval = interval;
        self
    }
}

/// Cached, rate-limited access to market snapshots.
pub struct MarketGateway {
    provider: Arc<dyn MarketProvider>,
    cache: Cache,
    politeness: Politeness,
    config: MarketGatewayConfig,
}

impl MarketGateway {
    pub fn new(provider: Arc<dyn MarketProvider>, cache: Cache, config: MarketGatewayConfig) -> Self {
        Self {
            provider,
            cache,
            politeness: Politeness::new(config.politeness_interval),
            config,
        }
    }

    pub fn config(&self) -> &MarketGatewayConfig {
        &self.config
    }

    /// The configured quote currency and default snapshot size.
    pub async fn default_market_data(&self) -> Vec<MarketSnapshot> {
        self.get_market_data(&self.config.currency, self.config.default_limit)
            .await
    }

    /// Ranked snapshot of the top `limit` coins. Empty when nothing is available.
    #[instrument(skip(self))]
    pub async fn get_market_data(&self, currency: &str, limit: usize) -> Vec<MarketSnapshot> {
        let key = CacheKey::market_data(currency, limit);

        if let Some(data) = self.fresh_snapshot(&key).await {
            return data;
        }

        match self.fetch_markets(currency, limit).await {
            Ok(data) => {
                self.cache.store(&key, &data).await;
                data
            }
            Err(e) => {
                log_upstream_failure(&e, "market data");
                self.stale_snapshot(&key).await.unwrap_or_default()
            }
        }
    }

    /// Latest snapshot for one coin by id or symbol, priced in the
    /// configured currency, or `None`.
    ///
    /// Misses resolve against a fresh cached top-N snapshot before asking
    /// the upstream. A definitive "no such coin" is cached as a negative
    /// entry; an upstream failure is not.
    #[instrument(skip(self))]
    pub async fn get_coin_by_name(&self, identifier: &str) -> Option<MarketSnapshot> {
        let id = identifier.trim().to_lowercase();
        let key = CacheKey::coin(&self.config.currency, &id);

        match self.cache.lookup::<MarketSnapshot>(&key).await {
            Lookup::Fresh(Cached::Present(coin)) => return Some(coin),
            Lookup::Fresh(Cached::Negative) => {
                debug!(coin = %id, "coin known to be absent");
                return None;
            }
            Lookup::Stale(_) | Lookup::Miss => {}
        }

        if let Some(coin) = self.find_in_cached_snapshot(&id).await {
            self.cache.store(&key, &coin).await;
            return Some(coin);
        }

        match self.fetch_coin(&id).await {
            Ok(Some(coin)) => {
                self.cache.store(&key, &coin).await;
                Some(coin)
            }
            Ok(None) => {
                debug!(coin = %id, "no upstream match, caching negative entry");
                self.cache.store_negative(&key).await;
                None
            }
            Err(e) => {
                log_upstream_failure(&e, "coin");
                self.stale_coin(&key).await
            }
        }
    }

    // ===== Tiers =====

    async fn fresh_snapshot(&self, key: &CacheKey) -> Option<Vec<MarketSnapshot>> {
        match self.cache.lookup(key).await {
            Lookup::Fresh(Cached::Present(data)) => Some(data),
            _ => None,
        }
    }

    /// Re-read after a failed fetch. A concurrent caller may have refreshed
    /// the entry in the meantime, in which case it is served as-is.
    async fn stale_snapshot(&self, key: &CacheKey) -> Option<Vec<MarketSnapshot>> {
        match self.cache.lookup(key).await {
            Lookup::Fresh(Cached::Present(data)) => Some(data),
            Lookup::Stale(Cached::Present(data)) => {
                self.cache.note_stale_served(key);
                Some(data)
            }
            _ => None,
        }
    }

    async fn stale_coin(&self, key: &CacheKey) -> Option<MarketSnapshot> {
        match self.cache.lookup(key).await {
            Lookup::Fresh(cached) => cached.into_option(),
            Lookup::Stale(cached) => {
                self.cache.note_stale_served(key);
                cached.into_option()
            }
            Lookup::Miss => None,
        }
    }

    async fn find_in_cached_snapshot(&self, id: &str) -> Option<MarketSnapshot> {
        let key = CacheKey::market_data(&self.config.currency, self.config.coin_lookup_depth);
        let snapshot: Vec<MarketSnapshot> = self.fresh_snapshot(&key).await?;
        snapshot.into_iter().find(|coin| coin.matches(id))
    }

    // ===== Upstream =====

    async fn fetch_markets(&self, currency: &str, limit: usize) -> Result<Vec<MarketSnapshot>> {
        self.politeness.acquire().await;
        debug!(provider = self.provider.name(), currency, limit, "fetching market data");
        self.provider.fetch_markets(currency, limit).await
    }

    async fn fetch_coin(&self, id: &str) -> Result<Option<MarketSnapshot>> {
        let currency = self.config.currency.as_str();
        self.politeness.acquire().await;
        debug!(provider = self.provider.name(), currency, coin = id, "fetching coin");
        self.provider.fetch_coin(currency, id).await
    }
}

fn log_upstream_failure(error: &KvasirError, what: &str) {
    if matches!(error, KvasirError::RateLimited { .. }) {
        warn!(what, error = %error, "upstream rate limit reached, checking cache for stale data");
    } else {
        warn!(what, error = %error, "upstream fetch failed, checking cache for stale data");
    }
}
