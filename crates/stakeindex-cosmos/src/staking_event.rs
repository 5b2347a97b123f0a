//! `cl_staking_event`: classified staking results of the consensus chain.

use std::sync::Arc;

use async_trait::async_trait;

use stakeindex_core::classifier::classify_block;
use stakeindex_core::error::IndexerError;
use stakeindex_core::indexer::Indexer;
use stakeindex_core::source::{fetch_heights, ConsensusSource};
use stakeindex_core::store::IndexStore;

use crate::CL_STAKING_EVENT;

pub struct ClStakingEventIndexer {
    source: Arc<dyn ConsensusSource>,
    store: Arc<dyn IndexStore>,
}

impl ClStakingEventIndexer {
    pub fn new(source: Arc<dyn ConsensusSource>, store: Arc<dyn IndexStore>) -> Self {
        Self { source, store }
    }
}

#[async_trait]
impl Indexer for ClStakingEventIndexer {
    fn name(&self) -> &'static str {
        CL_STAKING_EVENT
    }

    async fn target_height(&self) -> Result<u64, IndexerError> {
        self.source.current_height().await
    }

    /// A block whose events fail to classify aborts the whole range.
    async fn index_range(&self, from: u64, to: u64) -> Result<(), IndexerError> {
        let blocks = fetch_heights(from, to, |h| self.source.events_at(h)).await?;

        let mut rows = Vec::new();
        for (height, events) in (from..=to).zip(blocks) {
            rows.extend(classify_block(height, &events)?);
        }
        if !rows.is_empty() {
            tracing::debug!(indexer = self.name(), from, to, events = rows.len(), "Staking events classified");
        }

        self.store
            .commit_cl_staking_events(self.name(), &rows, to)
            .await
    }
}
