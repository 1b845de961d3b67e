//! Redis-backed cache store, shared by every process pointed at the same server.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::info;

use super::CacheStore;
use crate::Result;

/// [`CacheStore`] over a Redis connection manager.
///
/// The connection manager reconnects on its own; individual command failures
/// surface as [`KvasirError::Cache`](crate::KvasirError::Cache) and are
/// degraded to misses by [`Cache`](super::Cache).
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to the Redis server at `url` (e.g. `redis://localhost:6379/`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("connected to redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        // SETEX takes whole seconds and rejects zero; round up so the entry
        // outlives its millisecond envelope TTL.
        let ttl_secs = (ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0)).max(1);
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
