//! `cl_total_stake`: running total stake keyed by block time.
//!
//! Deltas come straight from the chain's `delegate_success` /
//! `undelegate_success` events; timestamps come from the `cl_blocks` table,
//! so the target height never passes the `cl_block` checkpoint.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use stakeindex_core::checkpoint::CheckpointStore;
use stakeindex_core::error::IndexerError;
use stakeindex_core::indexer::Indexer;
use stakeindex_core::source::{fetch_heights, ConsensusSource};
use stakeindex_core::stake::{StakeDeltas, StakeGenesis, StakeLedger};
use stakeindex_core::store::IndexStore;

use crate::{CL_BLOCK, CL_TOTAL_STAKE};

pub struct ClTotalStakeIndexer {
    source: Arc<dyn ConsensusSource>,
    store: Arc<dyn IndexStore>,
    genesis: StakeGenesis,
    ledger: Mutex<StakeLedger>,
}

impl ClTotalStakeIndexer {
    pub fn new(
        source: Arc<dyn ConsensusSource>,
        store: Arc<dyn IndexStore>,
        genesis: StakeGenesis,
    ) -> Self {
        Self {
            source,
            store,
            genesis,
            ledger: Mutex::new(StakeLedger::seeded(genesis.amount)),
        }
    }

    /// Current in-memory total.
    pub async fn total(&self) -> i64 {
        self.ledger.lock().await.total()
    }
}

#[async_trait]
impl Indexer for ClTotalStakeIndexer {
    fn name(&self) -> &'static str {
        CL_TOTAL_STAKE
    }

    async fn init(&self) -> Result<(), IndexerError> {
        self.store.seed_total_stake(&self.genesis.point()).await?;
        let latest = self
            .store
            .latest_total_stake()
            .await?
            .map_or(self.genesis.amount, |p| p.amount);
        *self.ledger.lock().await = StakeLedger::seeded(latest);
        tracing::info!(indexer = self.name(), total = latest, "Total stake seeded");
        Ok(())
    }

    async fn target_height(&self) -> Result<u64, IndexerError> {
        let head = self.source.current_height().await?;
        let blocks = self.store.load(CL_BLOCK).await?.unwrap_or(0);
        Ok(head.min(blocks))
    }

    /// Heights at or below the stored checkpoint are already in the ledger
    /// and are not applied again.
    async fn index_range(&self, from: u64, to: u64) -> Result<(), IndexerError> {
        let mut ledger = self.ledger.lock().await;
        let checkpoint = self.store.load(self.name()).await?.unwrap_or(0);
        let start = from.max(checkpoint + 1);
        if start > to {
            tracing::debug!(indexer = self.name(), from, to, checkpoint, "Range already applied");
            return Ok(());
        }

        let blocks = fetch_heights(start, to, |h| self.source.events_at(h)).await?;
        let mut deltas = StakeDeltas::new();
        for (height, events) in (start..=to).zip(blocks) {
            deltas.add_block(height, &events)?;
        }
        let times = self.store.consensus_block_times(&deltas.heights()).await?;

        let (next, points) = ledger.apply(&deltas, &times)?;
        self.store
            .commit_total_stakes(self.name(), &points, to)
            .await?;
        *ledger = next;
        Ok(())
    }
}
