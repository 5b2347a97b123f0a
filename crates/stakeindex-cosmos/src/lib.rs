//! stakeindex-cosmos — CometBFT reader and the consensus-side indexers.
//!
//! | indexer | table(s) | target height |
//! |---|---|---|
//! | [`ClBlockIndexer`] | `cl_blocks` | chain head |
//! | [`ClStakingEventIndexer`] | `cl_staking_events` | chain head |
//! | [`ClTotalStakeIndexer`] | `cl_total_stakes` | min(head, `cl_block`) |
//! | [`ClTotalStakeHistIndexer`] | `cl_total_stake_hists` | min(`cl_block`, `cl_staking_event`) |
//! | [`ClValidatorUptimeIndexer`] | `cl_validator_uptimes` | chain head |
//! | [`ClValidatorVoteIndexer`] | `cl_validator_votes` | chain head |

pub mod block;
pub mod client;
mod evidence;
pub mod staking_event;
pub mod total_stake;
pub mod total_stake_hist;
pub mod validator_uptime;
pub mod validator_vote;

pub use block::ClBlockIndexer;
pub use client::CometClient;
pub use staking_event::ClStakingEventIndexer;
pub use total_stake::ClTotalStakeIndexer;
pub use total_stake_hist::ClTotalStakeHistIndexer;
pub use validator_uptime::ClValidatorUptimeIndexer;
pub use validator_vote::ClValidatorVoteIndexer;

pub const CL_BLOCK: &str = "cl_block";
pub const CL_STAKING_EVENT: &str = "cl_staking_event";
pub const CL_TOTAL_STAKE: &str = "cl_total_stake";
pub const CL_TOTAL_STAKE_HIST: &str = "cl_total_stake_hist";
pub const CL_VALIDATOR_UPTIME: &str = "cl_validator_uptime";
pub const CL_VALIDATOR_VOTE: &str = "cl_validator_vote";
