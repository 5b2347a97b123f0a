//! Chain data sources consumed by the indexers.
//!
//! Both traits are implemented over JSON-RPC by the `stakeindex-cosmos` and
//! `stakeindex-evm` crates, and by scripted in-memory sources in tests.

use std::future::Future;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};

use crate::error::IndexerError;
use crate::types::{
    ActiveValidator, CommitSignature, ConsensusBlock, ExecutionBlock, RawEvent, RawLog,
    ValidatorPage,
};

/// Page size used when walking the active validator set.
pub const VALIDATORS_PER_PAGE: u32 = 100;

/// Requests kept in flight by [`fetch_heights`].
pub const FETCH_CONCURRENCY: usize = 8;

/// Run `fetch` for every height in `[from, to]` with bounded concurrency.
/// Results come back in ascending height order; the first error wins.
pub async fn fetch_heights<T, F, Fut>(from: u64, to: u64, fetch: F) -> Result<Vec<T>, IndexerError>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<T, IndexerError>>,
{
    futures::stream::iter(from..=to)
        .map(fetch)
        .buffered(FETCH_CONCURRENCY)
        .try_collect()
        .await
}

/// Consensus-layer (CometBFT) reader.
#[async_trait]
pub trait ConsensusSource: Send + Sync {
    /// Latest committed height.
    async fn current_height(&self) -> Result<u64, IndexerError>;

    async fn block_at(&self, height: u64) -> Result<ConsensusBlock, IndexerError>;

    /// Transaction result events followed by finalize-block events.
    async fn events_at(&self, height: u64) -> Result<Vec<RawEvent>, IndexerError>;

    /// Signatures of the commit for `height`.
    async fn commit_at(&self, height: u64) -> Result<Vec<CommitSignature>, IndexerError>;

    /// One page (1-based) of the active validator set at `height`.
    async fn active_validators_at(
        &self,
        height: u64,
        page: u32,
        per_page: u32,
    ) -> Result<ValidatorPage, IndexerError>;
}

/// Walk every page of the active validator set at `height`.
pub async fn all_active_validators(
    source: &dyn ConsensusSource,
    height: u64,
) -> Result<Vec<ActiveValidator>, IndexerError> {
    let mut out = Vec::new();
    let mut page = 1u32;
    loop {
        let res = source
            .active_validators_at(height, page, VALIDATORS_PER_PAGE)
            .await?;
        let fetched = res.validators.len();
        out.extend(res.validators);

        if fetched == 0 || u64::from(page) * u64::from(VALIDATORS_PER_PAGE) >= res.total {
            break;
        }
        page += 1;
    }
    Ok(out)
}

/// Execution-layer (EVM) reader.
#[async_trait]
pub trait ExecutionSource: Send + Sync {
    async fn current_height(&self) -> Result<u64, IndexerError>;

    /// Block header with its withdrawals.
    async fn block_at(&self, height: u64) -> Result<ExecutionBlock, IndexerError>;

    /// Every log emitted by the staking contract in `[from, to]`.
    async fn staking_logs(&self, from: u64, to: u64) -> Result<Vec<RawLog>, IndexerError>;
}
