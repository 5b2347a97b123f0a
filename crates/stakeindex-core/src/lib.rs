//! stakeindex-core — domain model, reconciliation algorithms and the
//! checkpointed polling loop of the staking indexer.
//!
//! # Architecture
//!
//! ```text
//! IndexerSet ──spawns──► IndexLoop (one task per indexer)
//!                            ├── CheckpointStore   (last committed height)
//!                            └── dyn Indexer
//!                                  ├── ConsensusSource / ExecutionSource
//!                                  ├── classifier · stake · uptime · reward
//!                                  ├── IndexStore    (rows + checkpoint, one tx)
//!                                  └── Cache         (best-effort invalidation)
//! ```

pub mod address;
pub mod cache;
pub mod checkpoint;
pub mod classifier;
pub mod error;
pub mod index_loop;
pub mod indexer;
pub mod metrics;
pub mod reward;
pub mod rpc;
pub mod source;
pub mod stake;
pub mod store;
pub mod supervisor;
pub mod telemetry;
pub mod types;
pub mod uptime;

pub use cache::{Cache, MemoryCache};
pub use checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
pub use error::IndexerError;
pub use index_loop::{IndexLoop, TickOutcome};
pub use indexer::{Indexer, IndexerConfig, IndexerState};
pub use metrics::StakeIndexMetrics;
pub use rpc::{JsonRpcClient, RetryPolicy, TransportError};
pub use source::{ConsensusSource, ExecutionSource};
pub use stake::{StakeGenesis, StakeLedger};
pub use store::IndexStore;
pub use supervisor::IndexerSet;
pub use telemetry::{init_tracing, LogConfig};
pub use types::*;
