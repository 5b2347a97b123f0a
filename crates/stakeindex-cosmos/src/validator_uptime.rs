//! `cl_validator_uptime`: compacted active interval and vote count per
//! validator.

use std::sync::Arc;

use async_trait::async_trait;

use stakeindex_core::cache::{invalidate_prefix, Cache, VALIDATORS_KEY_PREFIX};
use stakeindex_core::error::IndexerError;
use stakeindex_core::indexer::Indexer;
use stakeindex_core::source::{fetch_heights, ConsensusSource};
use stakeindex_core::store::IndexStore;
use stakeindex_core::uptime::UptimeTracker;

use crate::evidence::fetch_evidence;
use crate::CL_VALIDATOR_UPTIME;

pub struct ClValidatorUptimeIndexer {
    source: Arc<dyn ConsensusSource>,
    store: Arc<dyn IndexStore>,
    cache: Arc<dyn Cache>,
}

impl ClValidatorUptimeIndexer {
    pub fn new(
        source: Arc<dyn ConsensusSource>,
        store: Arc<dyn IndexStore>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        Self {
            source,
            store,
            cache,
        }
    }
}

#[async_trait]
impl Indexer for ClValidatorUptimeIndexer {
    fn name(&self) -> &'static str {
        CL_VALIDATOR_UPTIME
    }

    async fn target_height(&self) -> Result<u64, IndexerError> {
        self.source.current_height().await
    }

    async fn index_range(&self, from: u64, to: u64) -> Result<(), IndexerError> {
        let evidence = fetch_heights(from, to, |h| fetch_evidence(self.source.as_ref(), h)).await?;

        let mut tracker = UptimeTracker::new();
        for ev in &evidence {
            tracker.observe_active(ev.height, &ev.active);
            tracker.observe_commit(&ev.signatures);
        }
        let rows = tracker.into_rows();

        self.store
            .commit_validator_uptimes(self.name(), &rows, to)
            .await?;
        invalidate_prefix(self.cache.as_ref(), VALIDATORS_KEY_PREFIX).await;
        Ok(())
    }
}
