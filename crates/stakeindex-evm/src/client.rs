//! EVM JSON-RPC reader.
//!
//! Uses `eth_blockNumber`, `eth_getBlockByNumber` (header and withdrawals
//! only) and `eth_getLogs` filtered on the staking contract and every staking
//! topic0.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use stakeindex_core::address::normalize_hex;
use stakeindex_core::error::IndexerError;
use stakeindex_core::rpc::{JsonRpcClient, RetryPolicy};
use stakeindex_core::source::ExecutionSource;
use stakeindex_core::types::{ExecutionBlock, RawLog, Withdrawal};

use crate::decoder::staking_topics;

/// Default address of the staking contract predeploy.
pub const DEFAULT_STAKING_CONTRACT: &str = "0xCCcCcC0000000000000000000000000000000001";

// ─── Wire types ───────────────────────────────────────────────────────────────

/// A log as returned by `eth_getLogs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(rename = "logIndex")]
    pub log_index: String,
    #[serde(default)]
    pub removed: Option<bool>,
}

impl WireLog {
    pub fn into_raw(self) -> Result<RawLog, IndexerError> {
        Ok(RawLog {
            block_number: parse_hex_u64(&self.block_number)?,
            log_index: parse_hex_u64(&self.log_index)?,
            address: normalize_hex(&self.address),
            topics: self.topics,
            data: self.data,
            tx_hash: normalize_hex(&self.tx_hash),
            removed: self.removed.unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireWithdrawal {
    pub address: String,
    /// Gwei, hex quantity.
    pub amount: String,
}

/// `eth_getBlockByNumber(n, false)`, reduced to the fields we persist.
#[derive(Debug, Clone, Deserialize)]
pub struct WireBlock {
    pub number: String,
    pub hash: String,
    #[serde(rename = "gasUsed")]
    pub gas_used: String,
    #[serde(rename = "gasLimit")]
    pub gas_limit: String,
    pub timestamp: String,
    #[serde(default)]
    pub withdrawals: Option<Vec<WireWithdrawal>>,
}

impl WireBlock {
    pub fn into_block(self) -> Result<ExecutionBlock, IndexerError> {
        let withdrawals = self
            .withdrawals
            .unwrap_or_default()
            .into_iter()
            .map(|w| {
                Ok(Withdrawal {
                    address: normalize_hex(&w.address),
                    amount: parse_hex_u64(&w.amount)?,
                })
            })
            .collect::<Result<Vec<_>, IndexerError>>()?;
        Ok(ExecutionBlock {
            height: parse_hex_u64(&self.number)?,
            hash: normalize_hex(&self.hash),
            gas_used: parse_hex_u64(&self.gas_used)?,
            gas_limit: parse_hex_u64(&self.gas_limit)?,
            time: parse_hex_u64(&self.timestamp)? as i64,
            withdrawals,
        })
    }
}

/// Parse a hex quantity (with or without `0x`) to u64.
pub fn parse_hex_u64(s: &str) -> Result<u64, IndexerError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16)
        .map_err(|e| IndexerError::Decode(format!("hex quantity '{s}': {e}")))
}

fn to_hex(n: u64) -> String {
    format!("0x{n:x}")
}

// ─── Client ───────────────────────────────────────────────────────────────────

/// [`ExecutionSource`] over an EVM JSON-RPC endpoint.
pub struct EvmClient {
    rpc: JsonRpcClient,
    staking_contract: String,
    topics: Vec<String>,
}

impl EvmClient {
    pub fn new(
        url: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
        staking_contract: &str,
    ) -> Result<Self, IndexerError> {
        Ok(Self {
            rpc: JsonRpcClient::new(url, timeout, retry)?,
            staking_contract: normalize_hex(staking_contract),
            topics: staking_topics()
                .iter()
                .map(|t| format!("0x{}", hex::encode(t)))
                .collect(),
        })
    }

    pub fn url(&self) -> &str {
        self.rpc.url()
    }

    pub fn staking_contract(&self) -> &str {
        &self.staking_contract
    }

    fn logs_filter(&self, from: u64, to: u64) -> serde_json::Value {
        json!([{
            "fromBlock": to_hex(from),
            "toBlock": to_hex(to),
            "address": self.staking_contract,
            "topics": [self.topics],
        }])
    }
}

#[async_trait]
impl ExecutionSource for EvmClient {
    async fn current_height(&self) -> Result<u64, IndexerError> {
        let head: String = self.rpc.call("eth_blockNumber", json!([])).await?;
        parse_hex_u64(&head)
    }

    async fn block_at(&self, height: u64) -> Result<ExecutionBlock, IndexerError> {
        let block: Option<WireBlock> = self
            .rpc
            .call("eth_getBlockByNumber", json!([to_hex(height), false]))
            .await?;
        block
            .ok_or_else(|| IndexerError::Rpc(format!("block {height} not found")))?
            .into_block()
    }

    async fn staking_logs(&self, from: u64, to: u64) -> Result<Vec<RawLog>, IndexerError> {
        if to < from {
            return Ok(vec![]);
        }
        let logs: Vec<WireLog> = self
            .rpc
            .call("eth_getLogs", self.logs_filter(from, to))
            .await?;
        logs.into_iter().map(WireLog::into_raw).collect()
    }
}
