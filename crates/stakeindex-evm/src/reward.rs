//! `el_reward`: cumulative withdrawal totals per address.
//!
//! Withdrawals are folded into a [`RewardAccumulator`]. Once it holds
//! `flush_size` addresses it is written out with the checkpoint at the
//! current height; whatever is left is written at the end of the range, even
//! when empty, so the checkpoint always reaches `to`.

use std::sync::Arc;

use async_trait::async_trait;

use stakeindex_core::cache::{invalidate_keys, rewards_key, Cache};
use stakeindex_core::error::IndexerError;
use stakeindex_core::indexer::Indexer;
use stakeindex_core::reward::RewardAccumulator;
use stakeindex_core::source::{fetch_heights, ExecutionSource};
use stakeindex_core::store::IndexStore;

use crate::EL_REWARD;

pub struct ElRewardIndexer {
    source: Arc<dyn ExecutionSource>,
    store: Arc<dyn IndexStore>,
    cache: Arc<dyn Cache>,
    flush_size: usize,
}

impl ElRewardIndexer {
    pub fn new(
        source: Arc<dyn ExecutionSource>,
        store: Arc<dyn IndexStore>,
        cache: Arc<dyn Cache>,
        flush_size: usize,
    ) -> Self {
        Self {
            source,
            store,
            cache,
            flush_size: flush_size.max(1),
        }
    }

    async fn flush(&self, acc: &mut RewardAccumulator, checkpoint: u64) -> Result<(), IndexerError> {
        let deltas = acc.drain();
        self.store
            .commit_rewards(self.name(), &deltas, checkpoint)
            .await?;
        let keys: Vec<String> = deltas.iter().map(|d| rewards_key(&d.address)).collect();
        invalidate_keys(self.cache.as_ref(), &keys).await;
        tracing::debug!(
            indexer = self.name(),
            addresses = deltas.len(),
            checkpoint,
            "Rewards flushed"
        );
        Ok(())
    }
}

#[async_trait]
impl Indexer for ElRewardIndexer {
    fn name(&self) -> &'static str {
        EL_REWARD
    }

    async fn target_height(&self) -> Result<u64, IndexerError> {
        self.source.current_height().await
    }

    async fn index_range(&self, from: u64, to: u64) -> Result<(), IndexerError> {
        let blocks = fetch_heights(from, to, |h| self.source.block_at(h)).await?;

        let mut acc = RewardAccumulator::new(self.flush_size);
        for block in &blocks {
            acc.add_block(&block.withdrawals, block.height);
            if acc.should_flush() {
                self.flush(&mut acc, block.height).await?;
            }
        }
        self.flush(&mut acc, to).await
    }
}
