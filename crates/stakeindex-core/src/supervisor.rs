//! Runs a homogeneous set of indexers, one task each, until shutdown.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::checkpoint::CheckpointStore;
use crate::error::IndexerError;
use crate::index_loop::IndexLoop;
use crate::indexer::{Indexer, IndexerConfig};

pub struct IndexerSet {
    checkpoints: Arc<dyn CheckpointStore>,
    config: IndexerConfig,
    indexers: Vec<Arc<dyn Indexer>>,
}

impl IndexerSet {
    pub fn new(checkpoints: Arc<dyn CheckpointStore>, config: IndexerConfig) -> Self {
        Self {
            checkpoints,
            config,
            indexers: Vec::new(),
        }
    }

    pub fn push(&mut self, indexer: Arc<dyn Indexer>) {
        self.indexers.push(indexer);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.indexers.iter().map(|i| i.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.indexers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexers.is_empty()
    }

    /// Create missing checkpoints and run every indexer's `init`. Errors here
    /// are start-up errors and are returned to the caller.
    pub async fn init(&self) -> Result<(), IndexerError> {
        for indexer in &self.indexers {
            self.checkpoints.setup(indexer.name()).await?;
            indexer.init().await?;
            tracing::info!(indexer = indexer.name(), "Indexer initialized");
        }
        Ok(())
    }

    /// Spawn one loop per indexer and wait until all of them have observed
    /// `cancel` and exited.
    pub async fn run(self, cancel: CancellationToken) {
        let handles: Vec<_> = self
            .indexers
            .into_iter()
            .map(|indexer| {
                let name = indexer.name();
                let lp = IndexLoop::new(indexer, self.checkpoints.clone(), self.config.clone());
                (name, tokio::spawn(lp.run(cancel.clone())))
            })
            .collect();

        let (names, joins): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let results = futures::future::join_all(joins).await;
        for (name, res) in names.into_iter().zip(results) {
            if let Err(e) = res {
                tracing::error!(indexer = name, error = %e, "Indexer task panicked");
            }
        }
        tracing::info!("All indexers stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct Fixed {
        name: &'static str,
        head: u64,
        store: Arc<MemoryCheckpointStore>,
        initialized: AtomicBool,
    }

    #[async_trait]
    impl Indexer for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }
        async fn init(&self) -> Result<(), IndexerError> {
            self.initialized.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn target_height(&self) -> Result<u64, IndexerError> {
            Ok(self.head)
        }
        async fn index_range(&self, _from: u64, to: u64) -> Result<(), IndexerError> {
            self.store.advance(self.name, to).await
        }
    }

    #[tokio::test]
    async fn runs_all_until_cancelled() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let config = IndexerConfig {
            poll_interval_ms: 5,
            ..Default::default()
        };
        let mut set = IndexerSet::new(store.clone(), config);
        let a = Arc::new(Fixed {
            name: "a",
            head: 30,
            store: store.clone(),
            initialized: AtomicBool::new(false),
        });
        let b = Arc::new(Fixed {
            name: "b",
            head: 500,
            store: store.clone(),
            initialized: AtomicBool::new(false),
        });
        set.push(a.clone());
        set.push(b.clone());
        assert_eq!(set.names(), vec!["a", "b"]);

        set.init().await.unwrap();
        assert!(a.initialized.load(Ordering::SeqCst));
        assert_eq!(store.load("b").await.unwrap(), Some(0));

        let cancel = CancellationToken::new();
        let run = tokio::spawn(set.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        run.await.unwrap();

        assert_eq!(store.load("a").await.unwrap(), Some(30));
        assert_eq!(store.load("b").await.unwrap(), Some(500));
    }
}
