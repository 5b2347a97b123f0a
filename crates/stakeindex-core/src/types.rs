//! Shared types for the indexing pipeline.
//!
//! Execution-side addresses and hashes, validator EVM addresses and the
//! execution tx hash carried by consensus events are lower-case and
//! `0x`-prefixed, so rows from both chains join without case folding.
//! Consensus block hashes and proposer addresses stay as CometBFT reports
//! them.

use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

// ─── StakingEventType ─────────────────────────────────────────────────────────

/// Domain type of a staking operation, shared by both chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StakingEventType {
    SetOperator,
    UnsetOperator,
    SetWithdrawalAddress,
    SetRewardAddress,
    UpdateValidatorCommission,
    CreateValidator,
    Stake,
    StakeOnBehalf,
    Redelegate,
    RedelegateOnBehalf,
    Unstake,
    UnstakeOnBehalf,
    Unjail,
    UnjailOnBehalf,
}

impl StakingEventType {
    pub const ALL: [StakingEventType; 14] = [
        Self::SetOperator,
        Self::UnsetOperator,
        Self::SetWithdrawalAddress,
        Self::SetRewardAddress,
        Self::UpdateValidatorCommission,
        Self::CreateValidator,
        Self::Stake,
        Self::StakeOnBehalf,
        Self::Redelegate,
        Self::RedelegateOnBehalf,
        Self::Unstake,
        Self::UnstakeOnBehalf,
        Self::Unjail,
        Self::UnjailOnBehalf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetOperator => "SetOperator",
            Self::UnsetOperator => "UnsetOperator",
            Self::SetWithdrawalAddress => "SetWithdrawalAddress",
            Self::SetRewardAddress => "SetRewardAddress",
            Self::UpdateValidatorCommission => "UpdateValidatorCommission",
            Self::CreateValidator => "CreateValidator",
            Self::Stake => "Stake",
            Self::StakeOnBehalf => "StakeOnBehalf",
            Self::Redelegate => "Redelegate",
            Self::RedelegateOnBehalf => "RedelegateOnBehalf",
            Self::Unstake => "Unstake",
            Self::UnstakeOnBehalf => "UnstakeOnBehalf",
            Self::Unjail => "Unjail",
            Self::UnjailOnBehalf => "UnjailOnBehalf",
        }
    }

    /// The "on-behalf" variant of a delegation-family or unjail type.
    /// `None` for types that have no such variant.
    pub fn on_behalf(&self) -> Option<Self> {
        match self {
            Self::Stake => Some(Self::StakeOnBehalf),
            Self::Redelegate => Some(Self::RedelegateOnBehalf),
            Self::Unstake => Some(Self::UnstakeOnBehalf),
            Self::Unjail => Some(Self::UnjailOnBehalf),
            _ => None,
        }
    }
}

impl fmt::Display for StakingEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StakingEventType {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| IndexerError::Decode(format!("unknown staking event type '{s}'")))
    }
}

// ─── Blocks ───────────────────────────────────────────────────────────────────

/// One consensus-chain block header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusBlock {
    pub height: u64,
    pub hash: String,
    /// Proposer address as reported by CometBFT (upper-case hex, no prefix).
    pub proposer: String,
    /// Unix seconds.
    pub time: i64,
}

/// One execution-chain block, together with its withdrawals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionBlock {
    pub height: u64,
    pub hash: String,
    pub gas_used: u64,
    pub gas_limit: u64,
    /// Unix seconds.
    pub time: i64,
    /// Not persisted with the block; consumed by the reward aggregator.
    #[serde(default)]
    pub withdrawals: Vec<Withdrawal>,
}

/// A beacon withdrawal credited to an execution address. Amount is in gwei.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub address: String,
    pub amount: u64,
}

// ─── Raw chain data ───────────────────────────────────────────────────────────

/// A consensus-chain ABCI event as returned by `block_results`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

impl RawEvent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Vec::new(),
        }
    }

    /// Builder helper used by readers and tests.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(EventAttribute {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    /// Value of the last attribute named `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .rev()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
}

/// CometBFT `BlockIDFlag` of a commit signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockIdFlag {
    Unknown,
    Absent,
    Commit,
    Nil,
}

impl From<u64> for BlockIdFlag {
    fn from(value: u64) -> Self {
        match value {
            1 => Self::Absent,
            2 => Self::Commit,
            3 => Self::Nil,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSignature {
    pub flag: BlockIdFlag,
    /// CometBFT validator address (hex). Empty for absent signatures.
    pub validator_address: String,
}

/// A member of the active validator set at some height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveValidator {
    /// CometBFT validator address (hex).
    pub address: String,
    /// 33-byte compressed secp256k1 key.
    pub pub_key: Vec<u8>,
}

/// One page of the `validators` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorPage {
    pub validators: Vec<ActiveValidator>,
    pub total: u64,
}

/// An undecoded execution-chain log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: u64,
    pub tx_hash: String,
    pub log_index: u64,
    #[serde(default)]
    pub removed: bool,
}

// ─── Derived rows ─────────────────────────────────────────────────────────────

/// A classified consensus-side staking event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClStakingEvent {
    pub block_height: u64,
    /// Position of the raw event in the block's event list.
    pub event_index: u32,
    /// Hash of the execution-chain transaction that triggered it.
    pub el_tx_hash: String,
    pub event_type: StakingEventType,
    pub status_ok: bool,
    pub error_code: String,
    /// Raw decimal amount attribute; empty when the event carries none.
    pub amount: String,
}

/// A decoded execution-side staking log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElStakingEvent {
    pub tx_hash: String,
    pub log_index: u64,
    pub block_height: u64,
    pub event_type: StakingEventType,
    pub address: String,
    pub src_validator: String,
    pub dst_validator: String,
    pub dst_address: String,
}

/// Running total stake at a wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalStakePoint {
    /// Unix seconds; unique.
    pub updated_at: i64,
    pub amount: i64,
}

/// Block-anchored total stake row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalStakeHist {
    pub block: u64,
    pub time: i64,
    pub amount: i64,
}

/// A persisted successful stake or unstake joined with its block time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedStakeChange {
    pub block_height: u64,
    /// `None` when the consensus block row is not there yet.
    pub block_time: Option<i64>,
    pub event_type: StakingEventType,
    pub amount: String,
}

/// Compacted active interval and vote count of one validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUptime {
    pub evm_address: String,
    pub active_from: u64,
    pub active_to: u64,
    pub vote_count: u64,
}

/// One validator's vote evidence at one height.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatorVote {
    pub validator: String,
    pub block_height: u64,
}

/// Withdrawals accumulated for one address within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardDelta {
    pub address: String,
    pub amount: BigUint,
    pub height: u64,
}

/// Cumulative withdrawal total of an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reward {
    pub address: String,
    pub amount: BigUint,
    pub last_update_height: u64,
}
