//! `el_staking_event`: decoded staking-contract logs.

use std::sync::Arc;

use async_trait::async_trait;

use stakeindex_core::error::IndexerError;
use stakeindex_core::indexer::Indexer;
use stakeindex_core::source::ExecutionSource;
use stakeindex_core::store::IndexStore;

use crate::decoder::decode_logs;
use crate::EL_STAKING_EVENT;

pub struct ElStakingEventIndexer {
    source: Arc<dyn ExecutionSource>,
    store: Arc<dyn IndexStore>,
}

impl ElStakingEventIndexer {
    pub fn new(source: Arc<dyn ExecutionSource>, store: Arc<dyn IndexStore>) -> Self {
        Self { source, store }
    }
}

#[async_trait]
impl Indexer for ElStakingEventIndexer {
    fn name(&self) -> &'static str {
        EL_STAKING_EVENT
    }

    async fn target_height(&self) -> Result<u64, IndexerError> {
        self.source.current_height().await
    }

    /// One `eth_getLogs` call per range; a log that fails to decode aborts it.
    async fn index_range(&self, from: u64, to: u64) -> Result<(), IndexerError> {
        let logs = self.source.staking_logs(from, to).await?;
        let events = decode_logs(&logs)?;
        tracing::debug!(
            indexer = self.name(),
            from,
            to,
            logs = logs.len(),
            events = events.len(),
            "Staking logs decoded"
        );
        self.store
            .commit_el_staking_events(self.name(), &events, to)
            .await
    }
}
