//! The checkpoint-driven polling loop shared by every indexer.
//!
//! # Tick
//! 1. Load checkpoint `C` and ask the indexer for its target height `H`.
//! 2. If `H - C < lag`, do nothing.
//! 3. Otherwise process `[C+1, H]` in sub-ranges of at most `batch_size`
//!    heights. Each sub-range commits its rows and checkpoint together.
//! 4. The first failing sub-range aborts the tick; the checkpoint stays at
//!    the last committed boundary and the next tick resumes from there.
//!
//! # Shutdown
//! The cancellation token is checked before every sub-range. A batch that
//! has started always commits (or fails) as a whole; the tick then returns
//! [`TickOutcome::Interrupted`] and `run` exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::CheckpointStore;
use crate::error::IndexerError;
use crate::indexer::{Indexer, IndexerConfig, IndexerState};
use crate::metrics::StakeIndexMetrics;

/// Inclusive `[start, end]` sub-ranges of `[from, to]`, each at most `batch`
/// heights long.
pub fn sub_ranges(from: u64, to: u64, batch: u64) -> impl Iterator<Item = (u64, u64)> {
    let batch = batch.max(1);
    let mut next = Some(from).filter(|f| *f <= to);
    std::iter::from_fn(move || {
        let start = next?;
        let end = start.saturating_add(batch - 1).min(to);
        next = if end < to { Some(end + 1) } else { None };
        Some((start, end))
    })
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not enough new heights.
    Skipped { checkpoint: u64, target: u64 },
    /// `[from, to]` was fully committed.
    Indexed { from: u64, to: u64 },
    /// Cancelled between sub-ranges; everything up to `committed` is stored.
    Interrupted { from: u64, committed: u64 },
}

/// Drives one [`Indexer`].
pub struct IndexLoop {
    indexer: Arc<dyn Indexer>,
    checkpoints: Arc<dyn CheckpointStore>,
    config: IndexerConfig,
    state: IndexerState,
    cancel: CancellationToken,
    metrics: StakeIndexMetrics,
}

impl IndexLoop {
    pub fn new(
        indexer: Arc<dyn Indexer>,
        checkpoints: Arc<dyn CheckpointStore>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            indexer,
            checkpoints,
            config,
            state: IndexerState::Idle,
            cancel: CancellationToken::new(),
            metrics: StakeIndexMetrics::global().clone(),
        }
    }

    /// Stop ticks at the next sub-range boundary once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_metrics(mut self, metrics: StakeIndexMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn name(&self) -> &'static str {
        self.indexer.name()
    }

    pub fn state(&self) -> IndexerState {
        self.state
    }

    /// Run a single tick.
    pub async fn tick(&mut self) -> Result<TickOutcome, IndexerError> {
        let name = self.indexer.name();
        let checkpoint = self
            .checkpoints
            .load(name)
            .await?
            .ok_or_else(|| IndexerError::CheckpointMissing(name.to_string()))?;
        let target = self.indexer.target_height().await?;
        let lag = self.indexer.lag().unwrap_or(self.config.lag);

        if target <= checkpoint || target - checkpoint < lag {
            tracing::debug!(indexer = name, checkpoint, target, lag, "Not enough new heights");
            return Ok(TickOutcome::Skipped { checkpoint, target });
        }

        let from = checkpoint + 1;
        let mut committed = checkpoint;
        for (start, end) in sub_ranges(from, target, self.config.batch_size) {
            if self.cancel.is_cancelled() {
                tracing::info!(indexer = name, committed, target, "Cancelled between batches");
                return Ok(TickOutcome::Interrupted { from, committed });
            }
            if let Err(e) = self.indexer.index_range(start, end).await {
                self.metrics.record_index_error(name, &e);
                tracing::error!(
                    indexer = name,
                    from = start,
                    to = end,
                    error = %e,
                    "Index range failed"
                );
                return Err(e);
            }
            committed = end;
            self.metrics.record_batch(name);
            tracing::info!(indexer = name, from = start, to = end, target, "Batch committed");
        }

        Ok(TickOutcome::Indexed { from, to: target })
    }

    /// Tick every `poll_interval_ms` until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        self.cancel = cancel.clone();
        let name = self.indexer.name();
        let period = Duration::from_millis(self.config.poll_interval_ms.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(indexer = name, "Start indexing");
        self.state = IndexerState::Running;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.state = IndexerState::Indexing;
            if let Err(e) = self.tick().await {
                tracing::warn!(
                    indexer = name,
                    error = %e,
                    transient = e.is_transient(),
                    "Tick aborted, retrying next tick"
                );
            }
            self.state = IndexerState::Running;
        }

        self.state = IndexerState::Stopped;
        tracing::info!(indexer = name, "Stopped");
    }
}
