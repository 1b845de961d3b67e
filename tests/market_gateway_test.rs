//! Tests for [`MarketGateway`] cache tiers, negative caching and politeness.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use kvasir::cache::{Cache, CacheKey, CacheStore, CacheTtls, MemoryStore};
use kvasir::market::{MarketGateway, MarketGatewayConfig, MarketProvider};
use kvasir::types::MarketSnapshot;
use kvasir::{KvasirError, Result};

fn coin(id: &str, symbol: &str, change: f64) -> MarketSnapshot {
    MarketSnapshot {
        id: id.into(),
        symbol: symbol.into(),
        name: id.to_uppercase(),
        current_price: 100.0,
        market_cap: 1_000.0,
        total_volume: 10.0,
        price_change_percentage_24h: change,
    }
}

/// Scripted provider that counts upstream calls.
struct MockProvider {
    markets: Mutex<Vec<Result<Vec<MarketSnapshot>>>>,
    coins: Vec<MarketSnapshot>,
    fail_coin: bool,
    market_calls: AtomicU32,
    coin_calls: AtomicU32,
}

impl MockProvider {
    fn new(coins: Vec<MarketSnapshot>) -> Self {
        Self {
            markets: Mutex::new(Vec::new()),
            coins,
            fail_coin: false,
            market_calls: AtomicU32::new(0),
            coin_calls: AtomicU32::new(0),
        }
    }

    /// Queue market responses; each call pops the first one. Once the queue
    /// is empty every call succeeds with the full coin list.
    fn with_market_responses(self, responses: Vec<Result<Vec<MarketSnapshot>>>) -> Self {
        *self.markets.lock().unwrap() = responses;
        self
    }

    fn failing_coin_lookups(mut self) -> Self {
        self.fail_coin = true;
        self
    }

    fn market_calls(&self) -> u32 {
        self.market_calls.load(Ordering::SeqCst)
    }

    fn coin_calls(&self) -> u32 {
        self.coin_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketProvider for MockProvider {
    fn name(&self) -> &str {
        "mock-market"
    }

    async fn fetch_markets(&self, _currency: &str, limit: usize) -> Result<Vec<MarketSnapshot>> {
        self.market_calls.fetch_add(1, Ordering::SeqCst);
        let mut queue = self.markets.lock().unwrap();
        if queue.is_empty() {
            return Ok(self.coins.iter().take(limit).cloned().collect());
        }
        queue.remove(0)
    }

    async fn fetch_coin(&self, _currency: &str, id: &str) -> Result<Option<MarketSnapshot>> {
        self.coin_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_coin {
            return Err(KvasirError::Http("connection reset".into()));
        }
        Ok(self.coins.iter().find(|c| c.id == id).cloned())
    }
}

/// Store that fails every operation.
struct BrokenStore;

#[async_trait]
impl CacheStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(KvasirError::Cache("connection refused".into()))
    }

    async fn set_with_ttl(&self, _key: &str, _value: String, _ttl: Duration) -> Result<()> {
        Err(KvasirError::Cache("connection refused".into()))
    }

    async fn ping(&self) -> Result<()> {
        Err(KvasirError::Cache("connection refused".into()))
    }
}

fn fast_config() -> MarketGatewayConfig {
    MarketGatewayConfig::new().politeness_interval(Duration::from_millis(1))
}

fn gateway(provider: Arc<MockProvider>, cache: Cache) -> MarketGateway {
    MarketGateway::new(provider, cache, fast_config())
}

fn memory_cache(ttls: CacheTtls) -> Cache {
    Cache::new(Arc::new(MemoryStore::new()), ttls)
}

// =========================================================================
// get_market_data
// =========================================================================

#[tokio::test]
async fn second_call_is_served_from_cache() {
    let provider = Arc::new(MockProvider::new(vec![coin("bitcoin", "btc", 1.0)]));
    let gw = gateway(provider.clone(), Cache::in_memory());

    let first = gw.get_market_data("usd", 10).await;
    let second = gw.get_market_data("USD", 10).await;

    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
    assert_eq!(provider.market_calls(), 1);
}

#[tokio::test]
async fn different_limits_are_different_entries() {
    let provider = Arc::new(MockProvider::new(vec![
        coin("bitcoin", "btc", 1.0),
        coin("ethereum", "eth", 2.0),
    ]));
    let gw = gateway(provider.clone(), Cache::in_memory());

    assert_eq!(gw.get_market_data("usd", 1).await.len(), 1);
    assert_eq!(gw.get_market_data("usd", 2).await.len(), 2);
    assert_eq!(provider.market_calls(), 2);
}

#[tokio::test]
async fn throttled_without_cache_returns_empty() {
    let provider = Arc::new(MockProvider::new(vec![]).with_market_responses(vec![Err(
        KvasirError::RateLimited { retry_after: None },
    )]));
    let gw = gateway(provider.clone(), Cache::in_memory());

    let data = gw.get_market_data("usd", 10).await;
    assert!(data.is_empty());
    assert_eq!(provider.market_calls(), 1);
}

#[tokio::test]
async fn throttled_serves_expired_entry() {
    // Zero TTL: every entry is stale as soon as it is written, but retained.
    let cache = memory_cache(CacheTtls::new().market_data(Duration::ZERO));
    let provider = Arc::new(
        MockProvider::new(vec![]).with_market_responses(vec![
            Ok(vec![coin("bitcoin", "btc", 3.0)]),
            Err(KvasirError::RateLimited { retry_after: None }),
        ]),
    );
    let gw = gateway(provider.clone(), cache);

    let fresh = gw.get_market_data("usd", 10).await;
    let stale = gw.get_market_data("usd", 10).await;

    assert_eq!(provider.market_calls(), 2);
    assert_eq!(fresh, stale);
    assert_eq!(stale[0].id, "bitcoin");
}

#[tokio::test]
async fn upstream_error_serves_expired_entry() {
    let cache = memory_cache(CacheTtls::new().market_data(Duration::ZERO));
    let provider = Arc::new(MockProvider::new(vec![]).with_market_responses(vec![
        Ok(vec![coin("ethereum", "eth", -1.0)]),
        Err(KvasirError::Api {
            status: 500,
            message: "boom".into(),
        }),
    ]));
    let gw = gateway(provider.clone(), cache);

    gw.get_market_data("usd", 5).await;
    let stale = gw.get_market_data("usd", 5).await;

    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].id, "ethereum");
}

#[tokio::test]
async fn upstream_error_without_cache_returns_empty() {
    let provider = Arc::new(MockProvider::new(vec![]).with_market_responses(vec![Err(
        KvasirError::Http("dns failure".into()),
    )]));
    let gw = gateway(provider, Cache::in_memory());

    assert!(gw.get_market_data("usd", 10).await.is_empty());
}

#[tokio::test]
async fn broken_store_degrades_to_upstream() {
    let provider = Arc::new(MockProvider::new(vec![coin("bitcoin", "btc", 1.0)]));
    let cache = Cache::new(Arc::new(BrokenStore), CacheTtls::default());
    let gw = gateway(provider.clone(), cache);

    assert_eq!(gw.get_market_data("usd", 10).await.len(), 1);
    assert_eq!(gw.get_market_data("usd", 10).await.len(), 1);
    // Every read is a miss, so both calls reach the upstream.
    assert_eq!(provider.market_calls(), 2);
}

// =========================================================================
// get_coin_by_name
// =========================================================================

#[tokio::test]
async fn unknown_coin_is_negatively_cached() {
    let provider = Arc::new(MockProvider::new(vec![coin("bitcoin", "btc", 1.0)]));
    let gw = gateway(provider.clone(), Cache::in_memory());

    assert!(gw.get_coin_by_name("notacoin").await.is_none());
    let calls_after_first = provider.coin_calls() + provider.market_calls();

    assert!(gw.get_coin_by_name("NotACoin").await.is_none());
    assert_eq!(provider.coin_calls() + provider.market_calls(), calls_after_first);
}

#[tokio::test]
async fn known_coin_is_cached() {
    let provider = Arc::new(MockProvider::new(vec![coin("solana", "sol", 4.0)]));
    let gw = gateway(provider.clone(), Cache::in_memory());

    let first = gw.get_coin_by_name("solana").await.unwrap();
    let second = gw.get_coin_by_name("Solana").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(provider.coin_calls(), 1);
}

#[tokio::test]
async fn coin_resolves_from_cached_snapshot_without_upstream() {
    let provider = Arc::new(MockProvider::new(vec![
        coin("bitcoin", "btc", 1.0),
        coin("ripple", "xrp", -2.5),
    ]));
    let gw = gateway(provider.clone(), Cache::in_memory());

    // Warm the lookup-depth snapshot.
    gw.get_market_data("usd", 100).await;

    let found = gw.get_coin_by_name("XRP").await.unwrap();
    assert_eq!(found.id, "ripple");
    assert_eq!(provider.coin_calls(), 0);
}

#[tokio::test]
async fn coin_upstream_failure_is_not_negatively_cached() {
    let provider = Arc::new(MockProvider::new(vec![coin("bitcoin", "btc", 1.0)]).failing_coin_lookups());
    let gw = gateway(provider.clone(), Cache::in_memory());

    assert!(gw.get_coin_by_name("bitcoin").await.is_none());
    assert!(gw.get_coin_by_name("bitcoin").await.is_none());
    // Failure left no entry behind, so the second lookup retried upstream.
    assert_eq!(provider.coin_calls(), 2);
}

#[tokio::test]
async fn coin_upstream_failure_serves_stale_entry() {
    let cache = memory_cache(CacheTtls::new().coin_data(Duration::ZERO));
    cache
        .store(&CacheKey::coin("usd", "dogecoin"), &coin("dogecoin", "doge", 9.0))
        .await;
    let provider = Arc::new(MockProvider::new(vec![]).failing_coin_lookups());
    let gw = gateway(provider.clone(), cache);

    let stale = gw.get_coin_by_name("dogecoin").await.unwrap();
    assert_eq!(stale.price_change_percentage_24h, 9.0);
    assert_eq!(provider.coin_calls(), 1);
}

// =========================================================================
// Politeness
// =========================================================================

#[tokio::test(start_paused = true)]
async fn upstream_calls_are_spaced_across_keys() {
    let provider = Arc::new(MockProvider::new(vec![coin("bitcoin", "btc", 1.0)]));
    let gw = MarketGateway::new(
        provider.clone(),
        Cache::in_memory(),
        MarketGatewayConfig::new().politeness_interval(Duration::from_secs(2)),
    );

    let start = tokio::time::Instant::now();
    gw.get_market_data("usd", 5).await;
    gw.get_market_data("usd", 10).await;
    gw.get_coin_by_name("cardano").await;

    assert_eq!(provider.market_calls(), 2);
    assert_eq!(provider.coin_calls(), 1);
    assert!(start.elapsed() >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn cache_hits_are_not_delayed() {
    let provider = Arc::new(MockProvider::new(vec![coin("bitcoin", "btc", 1.0)]));
    let gw = MarketGateway::new(
        provider,
        Cache::in_memory(),
        MarketGatewayConfig::new().politeness_interval(Duration::from_secs(2)),
    );

    gw.get_market_data("usd", 5).await;
    let start = tokio::time::Instant::now();
    gw.get_market_data("usd", 5).await;
    assert_eq!(start.elapsed(), Duration::ZERO);
}
