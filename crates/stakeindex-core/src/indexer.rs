//! The `Indexer` capability and its scheduling configuration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// Minimum advance, in heights, before a tick does any work.
pub const DEFAULT_LAG: u64 = 10;
/// Maximum heights per committed sub-range.
pub const DEFAULT_BATCH_SIZE: u64 = 100;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;

/// Scheduling parameters shared by every index loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Tick period (milliseconds).
    pub poll_interval_ms: u64,
    /// Skip a tick while `target - checkpoint` is below this.
    pub lag: u64,
    /// Maximum heights per sub-range.
    pub batch_size: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            lag: DEFAULT_LAG,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// One derived dataset, advanced range by range by an `IndexLoop`.
///
/// Implementations own their store handle and must advance their own
/// checkpoint to `to` in the same transaction as the rows produced by
/// [`index_range`](Self::index_range).
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Checkpoint key, e.g. `"cl_block"`.
    fn name(&self) -> &'static str;

    /// One-time start-up work (seeding genesis rows, loading accumulators).
    async fn init(&self) -> Result<(), IndexerError> {
        Ok(())
    }

    /// Highest height this indexer may process right now.
    async fn target_height(&self) -> Result<u64, IndexerError>;

    /// Per-indexer lag override; `None` uses the loop's configured lag.
    fn lag(&self) -> Option<u64> {
        None
    }

    /// Process `[from, to]` and commit rows plus checkpoint `to`.
    async fn index_range(&self, from: u64, to: u64) -> Result<(), IndexerError>;
}

/// Runtime state of an index loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexerState {
    /// Not yet started.
    Idle,
    /// Waiting for the next tick.
    Running,
    /// Inside a tick.
    Indexing,
    /// Observed shutdown and exited.
    Stopped,
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Indexing => write!(f, "indexing"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
