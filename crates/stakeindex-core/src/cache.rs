//! Key-value cache collaborator and the keys the indexers invalidate.
//!
//! Cache failures never reach the indexing path: the `invalidate_*` helpers
//! log and swallow them.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::IndexerError;

/// TTL applied to cached read responses.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

pub const REWARDS_KEY_PREFIX: &str = "rewards";
pub const VALIDATORS_KEY_PREFIX: &str = "validators";

/// `rewards_<evm_address>`
pub fn rewards_key(evm_address: &str) -> String {
    format!("{REWARDS_KEY_PREFIX}_{evm_address}")
}

/// Pagination parameters of a cached validator listing.
#[derive(Debug, Clone, Default)]
pub struct ValidatorsQuery {
    pub status: String,
    pub key: String,
    pub offset: String,
    pub limit: String,
    pub count_total: String,
    pub reverse: String,
}

/// `validators_<status>_<key>_<offset>_<limit>_<count_total>_<reverse>`
pub fn validators_key(q: &ValidatorsQuery) -> String {
    format!(
        "{VALIDATORS_KEY_PREFIX}_{}_{}_{}_{}_{}_{}",
        q.status, q.key, q.offset, q.limit, q.count_total, q.reverse
    )
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, IndexerError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), IndexerError>;

    async fn delete(&self, keys: &[String]) -> Result<(), IndexerError>;

    /// Delete every key starting with `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> Result<(), IndexerError>;
}

/// Best-effort deletion of `keys`.
pub async fn invalidate_keys(cache: &dyn Cache, keys: &[String]) {
    if keys.is_empty() {
        return;
    }
    if let Err(e) = cache.delete(keys).await {
        tracing::warn!(error = %e, count = keys.len(), "cache invalidation failed");
    }
}

/// Best-effort deletion of every key under `prefix`.
pub async fn invalidate_prefix(cache: &dyn Cache, prefix: &str) {
    if let Err(e) = cache.delete_prefix(prefix).await {
        tracing::warn!(error = %e, prefix, "cache prefix invalidation failed");
    }
}

// ─── In-memory cache ──────────────────────────────────────────────────────────

/// Process-local cache used when no Redis endpoint is configured.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut HashMap<String, (String, Instant)>) -> R) -> R {
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn len(&self) -> usize {
        self.with(|m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, IndexerError> {
        let now = Instant::now();
        Ok(self.with(|m| {
            let expired = matches!(m.get(key), Some((_, expires)) if *expires <= now);
            if expired {
                m.remove(key);
                return None;
            }
            m.get(key).map(|(value, _)| value.clone())
        }))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), IndexerError> {
        self.with(|m| {
            m.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        });
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), IndexerError> {
        self.with(|m| {
            for k in keys {
                m.remove(k);
            }
        });
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), IndexerError> {
        self.with(|m| m.retain(|k, _| !k.starts_with(prefix)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    #[async_trait]
    impl Cache for Broken {
        async fn get(&self, _: &str) -> Result<Option<String>, IndexerError> {
            Err(IndexerError::Cache("down".into()))
        }
        async fn set(&self, _: &str, _: &str, _: Duration) -> Result<(), IndexerError> {
            Err(IndexerError::Cache("down".into()))
        }
        async fn delete(&self, _: &[String]) -> Result<(), IndexerError> {
            Err(IndexerError::Cache("down".into()))
        }
        async fn delete_prefix(&self, _: &str) -> Result<(), IndexerError> {
            Err(IndexerError::Cache("down".into()))
        }
    }

    #[test]
    fn key_formats() {
        assert_eq!(rewards_key("0xabc"), "rewards_0xabc");
        let q = ValidatorsQuery {
            status: "bonded".into(),
            limit: "10".into(),
            ..Default::default()
        };
        assert_eq!(validators_key(&q), "validators_bonded___10__");
    }

    #[tokio::test]
    async fn prefix_delete() {
        let cache = MemoryCache::new();
        cache.set("validators_a", "1", DEFAULT_CACHE_TTL).await.unwrap();
        cache.set("validators_b", "2", DEFAULT_CACHE_TTL).await.unwrap();
        cache.set("rewards_0x1", "3", DEFAULT_CACHE_TTL).await.unwrap();

        invalidate_prefix(&cache, VALIDATORS_KEY_PREFIX).await;

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("rewards_0x1").await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn expired_entries_disappear() {
        let cache = MemoryCache::new();
        cache.set("k", "v", Duration::from_millis(0)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        invalidate_keys(&Broken, &[rewards_key("0x1")]).await;
        invalidate_prefix(&Broken, REWARDS_KEY_PREFIX).await;
    }
}
