//! Caching subsystem.
//!
//! Two layers:
//!
//! - [`CacheStore`]: the raw key-value contract (`get`, `set_with_ttl`,
//!   `ping`) over a store that may live outside the process. Implemented by
//!   [`MemoryStore`] and, with the `redis` feature, [`RedisStore`].
//!
//! - [`Cache`]: a typed, best-effort facade used by every component above
//!   the store. It namespaces keys ([`CacheKey`]), serialises values as JSON
//!   envelopes, tracks freshness, and never propagates store failures: a
//!   failed read is a miss, a failed write is logged and dropped.
//!
//! # Freshness and stale entries
//!
//! Each value is written inside an envelope recording when it was stored
//! and its logical TTL, both in milliseconds. The store is told to keep the entry for
//! `ttl + stale_grace`, so after the logical TTL elapses the entry is still
//! readable but reported as [`Lookup::Stale`]. Callers refresh on a stale
//! read and may fall back to the stale value when the refresh fails.
//!
//! # Negative entries
//!
//! An envelope with `"value": null` records that a lookup was attempted and
//! found nothing. It reads back as [`Cached::Negative`], which is distinct
//! from a miss and from a present value.
//!
//! # Concurrency
//!
//! There is no locking and no compare-and-set. Concurrent misses on the same
//! key each fetch upstream and the last write wins. Per-key atomicity of
//! `get`/`set` is required of the store, so readers see either the old or
//! the new envelope.

mod key;
mod memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use key::{CacheKey, Namespace};
pub use memory::{DEFAULT_MAX_ENTRIES, MemoryStore};
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Result;
use crate::telemetry;

/// Raw key-value store with per-key expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a value. `Ok(None)` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value that the store evicts after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<()>;
}

// ============================================================================
// TTL configuration
// ============================================================================

/// Per-namespace freshness windows.
///
/// ```rust
/// # use kvasir::cache::CacheTtls;
/// # use std::time::Duration;
/// let ttls = CacheTtls::new()
///     .market_data(Duration::from_secs(60))
///     .stale_grace(Duration::from_secs(600));
/// assert_eq!(ttls.full_response, Duration::from_secs(1800));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CacheTtls {
    /// Ranked market snapshots. Default: 5 minutes.
    pub market_data: Duration,
    /// Single-coin snapshots and negative coin entries. Default: 10 minutes.
    pub coin_data: Duration,
    /// Classifier results. Default: 1 hour.
    pub sentiment: Duration,
    /// Composed answers. Default: 30 minutes.
    pub full_response: Duration,
    /// How long an entry stays readable as stale after its TTL. Default: 1 hour.
    pub stale_grace: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            market_data: Duration::from_secs(300),
            coin_data: Duration::from_secs(600),
            sentiment: Duration::from_secs(3600),
            full_response: Duration::from_secs(1800),
            stale_grace: Duration::from_secs(3600),
        }
    }
}

/// Env var name → namespace it overrides.
const TTL_ENV_VARS: &[(&str, Namespace)] = &[
    ("MARKET_DATA_TTL", Namespace::MarketData),
    ("COIN_DATA_TTL", Namespace::Coin),
    ("SENTIMENT_TTL", Namespace::Sentiment),
    ("FULL_RESPONSE_TTL", Namespace::FullResponse),
];

impl CacheTtls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn market_data(mut self, ttl: Duration) -> Self {
        self.market_data = ttl;
        self
    }

    pub fn coin_data(mut self, ttl: Duration) -> Self {
        self.coin_data = ttl;
        self
    }

    pub fn sentiment(mut self, ttl: Duration) -> Self {
        self.sentiment = ttl;
        self
    }

    pub fn full_response(mut self, ttl: Duration) -> Self {
        self.full_response = ttl;
        self
    }

    pub fn stale_grace(mut self, grace: Duration) -> Self {
        self.stale_grace = grace;
        self
    }

    /// Logical TTL for a namespace.
    pub fn for_namespace(&self, namespace: Namespace) -> Duration {
        match namespace {
            Namespace::MarketData => self.market_data,
            Namespace::Coin => self.coin_data,
            Namespace::Sentiment => self.sentiment,
            Namespace::FullResponse => self.full_response,
        }
    }

    fn set_namespace(&mut self, namespace: Namespace, ttl: Duration) {
        match namespace {
            Namespace::MarketData => self.market_data = ttl,
            Namespace::Coin => self.coin_data = ttl,
            Namespace::Sentiment => self.sentiment = ttl,
            Namespace::FullResponse => self.full_response = ttl,
        }
    }

    /// Apply `MARKET_DATA_TTL`, `COIN_DATA_TTL`, `SENTIMENT_TTL` and
    /// `FULL_RESPONSE_TTL` (whole seconds) from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Values that do not parse as whole seconds are ignored with a warning.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        for (var, namespace) in TTL_ENV_VARS {
            let Some(raw) = lookup(var) else { continue };
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.set_namespace(*namespace, Duration::from_secs(secs)),
                Err(e) => warn!(var, value = %raw, error = %e, "ignoring invalid TTL override"),
            }
        }
        self
    }
}

// ============================================================================
// Lookup results
// ============================================================================

/// A decoded cache value: either a payload or a negative entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Cached<T> {
    Present(T),
    /// The lookup was attempted and found nothing.
    Negative,
}

impl<T> Cached<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Cached::Present(v) => Some(v),
            Cached::Negative => None,
        }
    }
}

/// Outcome of reading a key through [`Cache`].
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// Absent, unreadable, or the store failed.
    Miss,
    /// Within its TTL.
    Fresh(Cached<T>),
    /// Past its TTL but still retained for stale-on-failure serving.
    Stale(Cached<T>),
}

impl<T> Lookup<T> {
    /// The value if it is fresh.
    pub fn fresh(self) -> Option<Cached<T>> {
        match self {
            Lookup::Fresh(v) => Some(v),
            _ => None,
        }
    }

    /// The value regardless of freshness.
    pub fn any(self) -> Option<Cached<T>> {
        match self {
            Lookup::Fresh(v) | Lookup::Stale(v) => Some(v),
            Lookup::Miss => None,
        }
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, Lookup::Miss)
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    stored_at_ms: u64,
    ttl_ms: u64,
    value: Option<&'a T>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    stored_at_ms: u64,
    ttl_ms: u64,
    value: Option<T>,
}

impl<T> Envelope<T> {
    fn is_fresh(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.stored_at_ms) < self.ttl_ms
    }
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(as_millis)
        .unwrap_or_default()
}

fn as_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Typed facade
// ============================================================================

/// Typed, namespaced, best-effort access to a [`CacheStore`].
///
/// Cheap to clone; all clones share the same store.
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
    ttls: CacheTtls,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>, ttls: CacheTtls) -> Self {
        Self { store, ttls }
    }

    /// An in-memory cache with default TTLs.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), CacheTtls::default())
    }

    pub fn ttls(&self) -> &CacheTtls {
        &self.ttls
    }

    /// Health of the underlying store. Unlike reads and writes, this does
    /// propagate the store error.
    pub async fn ping(&self) -> Result<()> {
        self.store.ping().await
    }

    /// Read and classify an entry. Never fails.
    pub async fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> Lookup<T> {
        let namespace = key.namespace().as_str();
        let raw_key = key.to_string();

        let raw = match self.store.get(&raw_key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %raw_key, error = %e, "cache read failed, treating as miss");
                metrics::counter!(telemetry::CACHE_ERRORS_TOTAL, "operation" => "get")
                    .increment(1);
                None
            }
        };

        let Some(raw) = raw else {
            debug!(key = %raw_key, "cache miss");
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "namespace" => namespace)
                .increment(1);
            return Lookup::Miss;
        };

        let envelope: Envelope<T> = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(key = %raw_key, error = %e, "undecodable cache entry, treating as miss");
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "namespace" => namespace)
                    .increment(1);
                return Lookup::Miss;
            }
        };

        let fresh = envelope.is_fresh(unix_now_ms());
        let value = match envelope.value {
            Some(v) => Cached::Present(v),
            None => Cached::Negative,
        };

        if fresh {
            debug!(key = %raw_key, "cache hit");
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "namespace" => namespace).increment(1);
            Lookup::Fresh(value)
        } else {
            debug!(key = %raw_key, "cache entry stale");
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "namespace" => namespace)
                .increment(1);
            Lookup::Stale(value)
        }
    }

    /// Write a present value with the namespace TTL.
    pub async fn store<T: Serialize>(&self, key: &CacheKey, value: &T) {
        self.write(key, Some(value)).await;
    }

    /// Write a negative entry with the namespace TTL.
    pub async fn store_negative(&self, key: &CacheKey) {
        self.write::<()>(key, None).await;
    }

    /// Record that a stale value is about to be served in place of fresh data.
    pub fn note_stale_served(&self, key: &CacheKey) {
        warn!(key = %key, "serving stale cached data");
        metrics::counter!(telemetry::CACHE_STALE_SERVED_TOTAL, "namespace" => key.namespace().as_str())
            .increment(1);
    }

    async fn write<T: Serialize>(&self, key: &CacheKey, value: Option<&T>) {
        let ttl = self.ttls.for_namespace(key.namespace());
        let raw_key = key.to_string();
        let envelope = EnvelopeRef {
            stored_at_ms: unix_now_ms(),
            ttl_ms: as_millis(ttl),
            value,
        };
        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %raw_key, error = %e, "failed to serialise cache entry");
                return;
            }
        };
        let retention = ttl + self.ttls.stale_grace;
        match self.store.set_with_ttl(&raw_key, payload, retention).await {
            Ok(()) => debug!(key = %raw_key, ttl_ms = as_millis(ttl), "cache set"),
            Err(e) => {
                warn!(key = %raw_key, error = %e, "cache write failed, continuing without it");
                metrics::counter!(telemetry::CACHE_ERRORS_TOTAL, "operation" => "set")
                    .increment(1);
            }
        }
    }
}
