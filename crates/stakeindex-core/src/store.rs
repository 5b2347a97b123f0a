//! The batch-writer contract of the relational store.
//!
//! Every `commit_*` method writes its rows and advances the named indexer's
//! checkpoint to `checkpoint` in one transaction. Keyed rows are upserted, so
//! re-committing blocks, events or stake points leaves the row set unchanged.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::checkpoint::CheckpointStore;
use crate::error::IndexerError;
use crate::types::{
    ClStakingEvent, ConsensusBlock, ElStakingEvent, ExecutionBlock, PersistedStakeChange,
    RewardDelta, TotalStakeHist, TotalStakePoint, ValidatorUptime, ValidatorVote,
};

#[async_trait]
pub trait IndexStore: CheckpointStore {
    // ─── Blocks ──────────────────────────────────────────────────────────────

    async fn commit_consensus_blocks(
        &self,
        indexer: &str,
        blocks: &[ConsensusBlock],
        checkpoint: u64,
    ) -> Result<(), IndexerError>;

    async fn commit_execution_blocks(
        &self,
        indexer: &str,
        blocks: &[ExecutionBlock],
        checkpoint: u64,
    ) -> Result<(), IndexerError>;

    /// Block times (unix seconds) of the given consensus heights. Heights
    /// without a stored block are absent from the map.
    async fn consensus_block_times(&self, heights: &[u64]) -> Result<HashMap<u64, i64>, IndexerError>;

    // ─── Staking events ──────────────────────────────────────────────────────

    async fn commit_cl_staking_events(
        &self,
        indexer: &str,
        events: &[ClStakingEvent],
        checkpoint: u64,
    ) -> Result<(), IndexerError>;

    async fn commit_el_staking_events(
        &self,
        indexer: &str,
        events: &[ElStakingEvent],
        checkpoint: u64,
    ) -> Result<(), IndexerError>;

    /// Successful Stake/Unstake consensus events with `from <= height <= to`,
    /// left-joined with their block time.
    async fn stake_changes_between(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<PersistedStakeChange>, IndexerError>;

    // ─── Total stake ─────────────────────────────────────────────────────────

    /// Insert the genesis point unless a point at that time already exists.
    async fn seed_total_stake(&self, genesis: &TotalStakePoint) -> Result<(), IndexerError>;

    async fn latest_total_stake(&self) -> Result<Option<TotalStakePoint>, IndexerError>;

    async fn commit_total_stakes(
        &self,
        indexer: &str,
        points: &[TotalStakePoint],
        checkpoint: u64,
    ) -> Result<(), IndexerError>;

    async fn seed_total_stake_hist(&self, genesis: &TotalStakeHist) -> Result<(), IndexerError>;

    async fn latest_total_stake_hist(&self) -> Result<Option<TotalStakeHist>, IndexerError>;

    async fn commit_total_stake_hists(
        &self,
        indexer: &str,
        rows: &[TotalStakeHist],
        checkpoint: u64,
    ) -> Result<(), IndexerError>;

    // ─── Validators ──────────────────────────────────────────────────────────

    /// Upsert uptime rows, extending a stored interval only when the incoming
    /// one starts right after it.
    async fn commit_validator_uptimes(
        &self,
        indexer: &str,
        rows: &[ValidatorUptime],
        checkpoint: u64,
    ) -> Result<(), IndexerError>;

    /// Insert vote rows, then delete every row below `keep_from`.
    async fn commit_validator_votes(
        &self,
        indexer: &str,
        votes: &[ValidatorVote],
        keep_from: u64,
        checkpoint: u64,
    ) -> Result<(), IndexerError>;

    // ─── Rewards ─────────────────────────────────────────────────────────────

    /// Add each delta onto the stored total.
    async fn commit_rewards(
        &self,
        indexer: &str,
        deltas: &[RewardDelta],
        checkpoint: u64,
    ) -> Result<(), IndexerError>;
}
