//! `cl_validator_vote`: per-height vote evidence over a sliding window.

use std::sync::Arc;

use async_trait::async_trait;

use stakeindex_core::cache::{invalidate_prefix, Cache, VALIDATORS_KEY_PREFIX};
use stakeindex_core::error::IndexerError;
use stakeindex_core::indexer::Indexer;
use stakeindex_core::source::{fetch_heights, ConsensusSource};
use stakeindex_core::store::IndexStore;
use stakeindex_core::uptime::{vote_rows, window_floor};

use crate::evidence::fetch_evidence;
use crate::CL_VALIDATOR_VOTE;

pub struct ClValidatorVoteIndexer {
    source: Arc<dyn ConsensusSource>,
    store: Arc<dyn IndexStore>,
    cache: Arc<dyn Cache>,
    window: u64,
}

impl ClValidatorVoteIndexer {
    pub fn new(
        source: Arc<dyn ConsensusSource>,
        store: Arc<dyn IndexStore>,
        cache: Arc<dyn Cache>,
        window: u64,
    ) -> Self {
        Self {
            source,
            store,
            cache,
            window: window.max(1),
        }
    }
}

#[async_trait]
impl Indexer for ClValidatorVoteIndexer {
    fn name(&self) -> &'static str {
        CL_VALIDATOR_VOTE
    }

    async fn target_height(&self) -> Result<u64, IndexerError> {
        self.source.current_height().await
    }

    /// A `commit` or `nil` signer missing from the active set aborts the
    /// range.
    async fn index_range(&self, from: u64, to: u64) -> Result<(), IndexerError> {
        let evidence = fetch_heights(from, to, |h| fetch_evidence(self.source.as_ref(), h)).await?;

        let mut votes = Vec::new();
        for ev in &evidence {
            votes.extend(vote_rows(ev.height, &ev.active, &ev.signatures)?);
        }
        let keep_from = window_floor(to, self.window);

        self.store
            .commit_validator_votes(self.name(), &votes, keep_from, to)
            .await?;
        invalidate_prefix(self.cache.as_ref(), VALIDATORS_KEY_PREFIX).await;
        Ok(())
    }
}
