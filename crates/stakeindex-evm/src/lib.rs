//! stakeindex-evm — EVM reader, staking-log decoder and the execution-side
//! indexers.
//!
//! | indexer | table | source |
//! |---|---|---|
//! | [`ElBlockIndexer`] | `el_blocks` | `eth_getBlockByNumber` |
//! | [`ElStakingEventIndexer`] | `el_staking_events` | `eth_getLogs` on the staking contract |
//! | [`ElRewardIndexer`] | `el_rewards` | block withdrawals |

pub mod block;
pub mod client;
pub mod decoder;
pub mod reward;
pub mod staking_event;

pub use block::ElBlockIndexer;
pub use client::{EvmClient, DEFAULT_STAKING_CONTRACT};
pub use reward::ElRewardIndexer;
pub use staking_event::ElStakingEventIndexer;

pub const EL_BLOCK: &str = "el_block";
pub const EL_STAKING_EVENT: &str = "el_staking_event";
pub const EL_REWARD: &str = "el_reward";
