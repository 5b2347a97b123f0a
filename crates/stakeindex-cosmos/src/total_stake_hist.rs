//! `cl_total_stake_hist`: block-anchored total stake rebuilt from the
//! persisted consensus staking events.
//!
//! Each range resumes from the latest stored history row, so the series is
//! reconstructable from `cl_staking_events` plus the genesis seed alone.

use std::sync::Arc;

use async_trait::async_trait;

use stakeindex_core::checkpoint::CheckpointStore;
use stakeindex_core::error::IndexerError;
use stakeindex_core::indexer::Indexer;
use stakeindex_core::stake::{persisted_deltas, StakeGenesis, StakeLedger};
use stakeindex_core::store::IndexStore;

use crate::{CL_BLOCK, CL_STAKING_EVENT, CL_TOTAL_STAKE_HIST};

pub struct ClTotalStakeHistIndexer {
    store: Arc<dyn IndexStore>,
    genesis: StakeGenesis,
}

impl ClTotalStakeHistIndexer {
    pub fn new(store: Arc<dyn IndexStore>, genesis: StakeGenesis) -> Self {
        Self { store, genesis }
    }
}

#[async_trait]
impl Indexer for ClTotalStakeHistIndexer {
    fn name(&self) -> &'static str {
        CL_TOTAL_STAKE_HIST
    }

    async fn init(&self) -> Result<(), IndexerError> {
        self.store.seed_total_stake_hist(&self.genesis.hist()).await
    }

    /// Both upstream tables must cover a height before it is replayed.
    async fn target_height(&self) -> Result<u64, IndexerError> {
        let blocks = self.store.load(CL_BLOCK).await?.unwrap_or(0);
        let events = self.store.load(CL_STAKING_EVENT).await?.unwrap_or(0);
        Ok(blocks.min(events))
    }

    fn lag(&self) -> Option<u64> {
        Some(1)
    }

    async fn index_range(&self, from: u64, to: u64) -> Result<(), IndexerError> {
        let latest = self
            .store
            .latest_total_stake_hist()
            .await?
            .unwrap_or_else(|| self.genesis.hist());

        let start = from.max(latest.block + 1);
        let changes = if start <= to {
            self.store.stake_changes_between(start, to).await?
        } else {
            Vec::new()
        };
        let (deltas, times) = persisted_deltas(&changes)?;
        let (_, rows) = StakeLedger::seeded(latest.amount).apply_hist(&deltas, &times)?;

        self.store
            .commit_total_stake_hists(self.name(), &rows, to)
            .await
    }
}
