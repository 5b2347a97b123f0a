//! `cl_block`: consensus block headers.

use std::sync::Arc;

use async_trait::async_trait;

use stakeindex_core::error::IndexerError;
use stakeindex_core::indexer::Indexer;
use stakeindex_core::source::{fetch_heights, ConsensusSource};
use stakeindex_core::store::IndexStore;

use crate::CL_BLOCK;

pub struct ClBlockIndexer {
    source: Arc<dyn ConsensusSource>,
    store: Arc<dyn IndexStore>,
}

impl ClBlockIndexer {
    pub fn new(source: Arc<dyn ConsensusSource>, store: Arc<dyn IndexStore>) -> Self {
        Self { source, store }
    }
}

#[async_trait]
impl Indexer for ClBlockIndexer {
    fn name(&self) -> &'static str {
        CL_BLOCK
    }

    async fn target_height(&self) -> Result<u64, IndexerError> {
        self.source.current_height().await
    }

    async fn index_range(&self, from: u64, to: u64) -> Result<(), IndexerError> {
        let blocks = fetch_heights(from, to, |h| self.source.block_at(h)).await?;
        self.store
            .commit_consensus_blocks(self.name(), &blocks, to)
            .await
    }
}
