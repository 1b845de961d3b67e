//! Tests for the typed [`Cache`] facade: freshness, negative entries and
//! store failure degradation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kvasir::cache::{Cache, CacheKey, CacheStore, CacheTtls, Cached, Lookup, MemoryStore};
use kvasir::types::{SentimentLabel, SentimentResult};
use kvasir::{KvasirError, Result};

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

fn sentiment(label: SentimentLabel, score: f32) -> SentimentResult {
    SentimentResult { label, score }
}

#[tokio::test]
async fn absent_key_is_a_miss() {
    let cache = Cache::in_memory();
    let lookup: Lookup<SentimentResult> = cache.lookup(&CacheKey::sentiment("anything")).await;
    assert!(lookup.is_miss());
}

#[tokio::test]
async fn stored_value_reads_back_fresh() {
    let cache = Cache::in_memory();
    let key = CacheKey::sentiment("is bitcoin going up?");
    let value = sentiment(SentimentLabel::Positive, 0.9);

    cache.store(&key, &value).await;

    let lookup: Lookup<SentimentResult> = cache.lookup(&key).await;
    assert_eq!(lookup, Lookup::Fresh(Cached::Present(value)));
}

#[tokio::test]
async fn negative_entry_is_distinct_from_miss() {
    let cache = Cache::in_memory();
    let key = CacheKey::coin("usd", "notacoin");

    cache.store_negative(&key).await;

    let lookup: Lookup<SentimentResult> = cache.lookup(&key).await;
    assert_eq!(lookup, Lookup::Fresh(Cached::Negative));
    assert!(!lookup.is_miss());
}

#[tokio::test]
async fn expired_entry_is_stale_within_grace() {
    let ttls = CacheTtls::new()
        .sentiment(Duration::ZERO)
        .stale_grace(Duration::from_secs(60));
    let cache = Cache::new(Arc::new(MemoryStore::new()), ttls);
    let key = CacheKey::sentiment("q");
    let value = sentiment(SentimentLabel::Negative, 0.4);

    cache.store(&key, &value).await;

    let lookup: Lookup<SentimentResult> = cache.lookup(&key).await;
    assert_eq!(lookup.clone().fresh(), None);
    assert_eq!(lookup.any(), Some(Cached::Present(value)));
}

#[tokio::test]
async fn keys_differing_only_in_case_share_an_entry() {
    let cache = Cache::in_memory();
    let value = sentiment(SentimentLabel::Neutral, 0.5);

    cache
        .store(&CacheKey::sentiment("What about ETH?"), &value)
        .await;

    let lookup: Lookup<SentimentResult> =
        cache.lookup(&CacheKey::sentiment("what about eth?")).await;
    assert_eq!(lookup, Lookup::Fresh(Cached::Present(value)));
}

#[tokio::test]
async fn namespaces_are_independent() {
    let cache = Cache::in_memory();
    let question = "bitcoin";

    cache
        .store(&CacheKey::sentiment(question), &sentiment(SentimentLabel::Positive, 0.7))
        .await;

    let lookup: Lookup<SentimentResult> = cache.lookup(&CacheKey::full_response(question)).await;
    assert!(lookup.is_miss());
}

#[tokio::test]
async fn undecodable_entry_is_a_miss() {
    let store = Arc::new(MemoryStore::new());
    store
        .set_with_ttl("sentiment:q", "not json".into(), Duration::from_secs(60))
        .await
        .unwrap();
    let cache = Cache::new(store, CacheTtls::default());

    let lookup: Lookup<SentimentResult> = cache.lookup(&CacheKey::sentiment("q")).await;
    assert!(lookup.is_miss());
}

#[tokio::test]
async fn store_failure_degrades_to_miss() {
    let cache = Cache::new(Arc::new(BrokenStore), CacheTtls::default());
    let key = CacheKey::sentiment("q");

    // Writes are swallowed, reads become misses.
    cache.store(&key, &sentiment(SentimentLabel::Positive, 0.9)).await;
    let lookup: Lookup<SentimentResult> = cache.lookup(&key).await;
    assert!(lookup.is_miss());
}

#[tokio::test]
async fn ping_propagates_store_failure() {
    let broken = Cache::new(Arc::new(BrokenStore), CacheTtls::default());
    assert!(matches!(broken.ping().await, Err(KvasirError::Cache(_))));
    assert!(Cache::in_memory().ping().await.is_ok());
}

#[test]
fn ttl_overrides_from_lookup() {
    let ttls = CacheTtls::default().with_overrides_from(|name| match name {
        "MARKET_DATA_TTL" => Some("42".into()),
        "SENTIMENT_TTL" => Some("not-a-number".into()),
        _ => None,
    });
    assert_eq!(ttls.market_data, Duration::from_secs(42));
    assert_eq!(ttls.sentiment, CacheTtls::default().sentiment);
    assert_eq!(ttls.coin_data, CacheTtls::default().coin_data);
}
