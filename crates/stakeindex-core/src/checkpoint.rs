//! Checkpoints record the last fully processed height of each indexer.
//!
//! A checkpoint row is created once per indexer at height 0 and afterwards
//! only moves forward, inside the same transaction as the rows it guards.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// A persisted checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Indexer name (e.g. `"cl_block"`).
    pub indexer: String,
    /// Last successfully processed height.
    pub height: u64,
}

/// Trait for storing and loading checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Create the checkpoint at height 0 if it does not exist yet.
    async fn setup(&self, indexer: &str) -> Result<(), IndexerError>;

    /// Load the checkpoint height. `None` if [`setup`](Self::setup) was never run.
    async fn load(&self, indexer: &str) -> Result<Option<u64>, IndexerError>;

    /// Advance the checkpoint. Never moves it backwards.
    async fn advance(&self, indexer: &str, height: u64) -> Result<(), IndexerError>;

    /// Every checkpoint, ordered by indexer name.
    async fn list(&self) -> Result<Vec<Checkpoint>, IndexerError>;
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory checkpoint store for tests and dry runs.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    data: Mutex<HashMap<String, u64>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut HashMap<String, u64>) -> R) -> R {
        let mut guard = self.data.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn setup(&self, indexer: &str) -> Result<(), IndexerError> {
        self.with(|m| {
            m.entry(indexer.to_string()).or_insert(0);
        });
        Ok(())
    }

    async fn load(&self, indexer: &str) -> Result<Option<u64>, IndexerError> {
        Ok(self.with(|m| m.get(indexer).copied()))
    }

    async fn advance(&self, indexer: &str, height: u64) -> Result<(), IndexerError> {
        self.with(|m| match m.get_mut(indexer) {
            Some(h) => {
                *h = (*h).max(height);
                Ok(())
            }
            None => Err(IndexerError::CheckpointMissing(indexer.to_string())),
        })
    }

    async fn list(&self) -> Result<Vec<Checkpoint>, IndexerError> {
        let mut out: Vec<_> = self.with(|m| {
            m.iter()
                .map(|(k, v)| Checkpoint {
                    indexer: k.clone(),
                    height: *v,
                })
                .collect()
        });
        out.sort_by(|a, b| a.indexer.cmp(&b.indexer));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn setup_is_idempotent() {
        let store = MemoryCheckpointStore::new();
        assert_eq!(store.load("cl_block").await.unwrap(), None);

        store.setup("cl_block").await.unwrap();
        store.advance("cl_block", 50).await.unwrap();
        store.setup("cl_block").await.unwrap();

        assert_eq!(store.load("cl_block").await.unwrap(), Some(50));
    }

    #[tokio::test]
    async fn never_moves_backwards() {
        let store = MemoryCheckpointStore::new();
        store.setup("el_block").await.unwrap();
        store.advance("el_block", 100).await.unwrap();
        store.advance("el_block", 90).await.unwrap();
        assert_eq!(store.load("el_block").await.unwrap(), Some(100));
    }

    #[tokio::test]
    async fn advance_requires_setup() {
        let store = MemoryCheckpointStore::new();
        assert!(matches!(
            store.advance("nope", 1).await,
            Err(IndexerError::CheckpointMissing(_))
        ));
    }
}
