//! Redis-backed [`Cache`] (feature `redis`).
//!
//! Prefix deletion walks the keyspace with `SCAN MATCH <prefix>*` in batches
//! of [`SCAN_BATCH`] and deletes each batch.

use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};

use stakeindex_core::cache::Cache;
use stakeindex_core::error::IndexerError;

/// Keys requested per `SCAN` round trip.
pub const SCAN_BATCH: usize = 100;

fn cache_err(e: redis::RedisError) -> IndexerError {
    IndexerError::Cache(e.to_string())
}

#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self, IndexerError> {
        let client = redis::Client::open(redis_url).map_err(cache_err)?;
        let manager = ConnectionManager::new(client).await.map_err(cache_err)?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, IndexerError> {
        let mut conn = self.manager.clone();
        conn.get::<_, Option<String>>(key).await.map_err(cache_err)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), IndexerError> {
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(cache_err)
    }

    async fn delete(&self, keys: &[String]) -> Result<(), IndexerError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(keys).await.map_err(cache_err)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), IndexerError> {
        let mut conn = self.manager.clone();
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(cache_err)?;

            if !keys.is_empty() {
                conn.del::<_, ()>(&keys).await.map_err(cache_err)?;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        tracing::debug!(prefix, "cache prefix deleted");
        Ok(())
    }
}
