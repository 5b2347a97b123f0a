//! CometBFT JSON-RPC reader.
//!
//! Talks to the node's `/` JSON-RPC endpoint with named parameters. Heights
//! and counters are sent and received as decimal strings, as CometBFT does.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use stakeindex_core::error::IndexerError;
use stakeindex_core::rpc::{JsonRpcClient, RetryPolicy};
use stakeindex_core::source::ConsensusSource;
use stakeindex_core::types::{
    ActiveValidator, BlockIdFlag, CommitSignature, ConsensusBlock, EventAttribute, RawEvent,
    ValidatorPage,
};

// ─── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct StatusResult {
    pub sync_info: SyncInfo,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SyncInfo {
    pub latest_block_height: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BlockResult {
    pub block_id: BlockId,
    pub block: Block,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BlockId {
    pub hash: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Block {
    pub header: Header,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Header {
    pub height: String,
    pub time: String,
    pub proposer_address: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BlockResultsResult {
    #[serde(default)]
    pub txs_results: Option<Vec<TxResult>>,
    #[serde(default)]
    pub finalize_block_events: Option<Vec<WireEvent>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TxResult {
    #[serde(default)]
    pub events: Option<Vec<WireEvent>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Option<Vec<WireAttribute>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireAttribute {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl From<WireEvent> for RawEvent {
    fn from(e: WireEvent) -> Self {
        RawEvent {
            kind: e.kind,
            attributes: e
                .attributes
                .unwrap_or_default()
                .into_iter()
                .map(|a| EventAttribute {
                    key: a.key,
                    value: a.value.unwrap_or_default(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitResult {
    pub signed_header: SignedHeader,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SignedHeader {
    pub commit: Commit,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Commit {
    #[serde(default)]
    pub signatures: Vec<WireSignature>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireSignature {
    pub block_id_flag: u64,
    #[serde(default)]
    pub validator_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ValidatorsResult {
    #[serde(default)]
    pub validators: Vec<WireValidator>,
    pub total: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireValidator {
    pub address: String,
    pub pub_key: WirePubKey,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WirePubKey {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

fn parse_u64(field: &str, raw: &str) -> Result<u64, IndexerError> {
    raw.parse::<u64>()
        .map_err(|e| IndexerError::Decode(format!("{field} '{raw}': {e}")))
}

/// RFC 3339 timestamp → unix seconds.
pub(crate) fn parse_block_time(raw: &str) -> Result<i64, IndexerError> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|t| t.timestamp())
        .map_err(|e| IndexerError::Decode(format!("block time '{raw}': {e}")))
}

impl BlockResult {
    pub(crate) fn into_block(self) -> Result<ConsensusBlock, IndexerError> {
        Ok(ConsensusBlock {
            height: parse_u64("height", &self.block.header.height)?,
            hash: self.block_id.hash,
            proposer: self.block.header.proposer_address,
            time: parse_block_time(&self.block.header.time)?,
        })
    }
}

impl BlockResultsResult {
    /// Transaction events in transaction order, then finalize-block events.
    pub(crate) fn into_events(self) -> Vec<RawEvent> {
        self.txs_results
            .unwrap_or_default()
            .into_iter()
            .flat_map(|tx| tx.events.unwrap_or_default())
            .chain(self.finalize_block_events.unwrap_or_default())
            .map(RawEvent::from)
            .collect()
    }
}

impl ValidatorsResult {
    pub(crate) fn into_page(self) -> Result<ValidatorPage, IndexerError> {
        let total = parse_u64("total", &self.total)?;
        let validators = self
            .validators
            .into_iter()
            .map(|v| {
                let pub_key = BASE64.decode(v.pub_key.value.as_bytes()).map_err(|e| {
                    IndexerError::InvalidPubkey(format!(
                        "{} key of {}: {e}",
                        v.pub_key.kind, v.address
                    ))
                })?;
                Ok(ActiveValidator {
                    address: v.address,
                    pub_key,
                })
            })
            .collect::<Result<Vec<_>, IndexerError>>()?;
        Ok(ValidatorPage { validators, total })
    }
}

// ─── Client ───────────────────────────────────────────────────────────────────

/// [`ConsensusSource`] over a CometBFT RPC endpoint.
pub struct CometClient {
    rpc: JsonRpcClient,
}

impl CometClient {
    pub fn new(url: impl Into<String>, timeout: Duration, retry: RetryPolicy) -> Result<Self, IndexerError> {
        Ok(Self {
            rpc: JsonRpcClient::new(url, timeout, retry)?,
        })
    }

    pub fn url(&self) -> &str {
        self.rpc.url()
    }
}

#[async_trait]
impl ConsensusSource for CometClient {
    async fn current_height(&self) -> Result<u64, IndexerError> {
        let status: StatusResult = self.rpc.call("status", json!({})).await?;
        parse_u64("latest_block_height", &status.sync_info.latest_block_height)
    }

    async fn block_at(&self, height: u64) -> Result<ConsensusBlock, IndexerError> {
        let res: BlockResult = self
            .rpc
            .call("block", json!({ "height": height.to_string() }))
            .await?;
        res.into_block()
    }

    async fn events_at(&self, height: u64) -> Result<Vec<RawEvent>, IndexerError> {
        let res: BlockResultsResult = self
            .rpc
            .call("block_results", json!({ "height": height.to_string() }))
            .await?;
        Ok(res.into_events())
    }

    async fn commit_at(&self, height: u64) -> Result<Vec<CommitSignature>, IndexerError> {
        let res: CommitResult = self
            .rpc
            .call("commit", json!({ "height": height.to_string() }))
            .await?;
        Ok(res
            .signed_header
            .commit
            .signatures
            .into_iter()
            .map(|s| CommitSignature {
                flag: BlockIdFlag::from(s.block_id_flag),
                validator_address: s.validator_address.unwrap_or_default(),
            })
            .collect())
    }

    async fn active_validators_at(
        &self,
        height: u64,
        page: u32,
        per_page: u32,
    ) -> Result<ValidatorPage, IndexerError> {
        let res: ValidatorsResult = self
            .rpc
            .call(
                "validators",
                json!({
                    "height": height.to_string(),
                    "page": page.to_string(),
                    "per_page": per_page.to_string(),
                }),
            )
            .await?;
        res.into_page()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn block_decodes() {
        let res: BlockResult = serde_json::from_value(json!({
            "block_id": { "hash": "6B1D5A0E9C1C2F1B7D0B1A0FE7C1D2A2F1A0B9C8D7E6F5A4B3C2D1E0F9A8B7C6", "parts": {} },
            "block": {
                "header": {
                    "chain_id": "devnet-1",
                    "height": "1024",
                    "time": "2025-01-19T15:00:07.123456789Z",
                    "proposer_address": "A1B2C3D4E5F60718293A4B5C6D7E8F9012345678"
                },
                "data": { "txs": [] }
            }
        }))
        .unwrap();
        let block = res.into_block().unwrap();
        assert_eq!(block.height, 1024);
        assert_eq!(block.time, 1_737_298_807);
        assert_eq!(block.proposer, "A1B2C3D4E5F60718293A4B5C6D7E8F9012345678");
    }

    #[test]
    fn block_results_tolerate_nulls() {
        let res: BlockResultsResult = serde_json::from_value(json!({
            "height": "7",
            "txs_results": null,
            "finalize_block_events": [
                { "type": "delegate_success", "attributes": [
                    { "key": "amount", "value": "100", "index": true },
                    { "key": "memo", "value": null }
                ] }
            ]
        }))
        .unwrap();
        let events = res.into_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].get("amount"), Some("100"));
        assert_eq!(events[0].get("memo"), Some(""));
    }

    #[test]
    fn tx_events_precede_finalize_events() {
        let res: BlockResultsResult = serde_json::from_value(json!({
            "txs_results": [
                { "code": 0, "events": [ { "type": "a", "attributes": [] } ] },
                { "code": 0, "events": null },
                { "code": 0, "events": [ { "type": "b" } ] }
            ],
            "finalize_block_events": [ { "type": "c", "attributes": [] } ]
        }))
        .unwrap();
        let kinds: Vec<_> = res.into_events().into_iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec!["a", "b", "c"]);
    }

    #[test]
    fn commit_flags() {
        let res: CommitResult = serde_json::from_value(json!({
            "signed_header": {
                "header": {},
                "commit": {
                    "height": "9",
                    "signatures": [
                        { "block_id_flag": 2, "validator_address": "AA", "signature": "x" },
                        { "block_id_flag": 1, "validator_address": "", "signature": null },
                        { "block_id_flag": 3, "validator_address": "BB" }
                    ]
                }
            },
            "canonical": true
        }))
        .unwrap();
        let flags: Vec<_> = res
            .signed_header
            .commit
            .signatures
            .iter()
            .map(|s| BlockIdFlag::from(s.block_id_flag))
            .collect();
        assert_eq!(flags, vec![BlockIdFlag::Commit, BlockIdFlag::Absent, BlockIdFlag::Nil]);
    }

    #[test]
    fn validators_decode_base64_keys() {
        let res: ValidatorsResult = serde_json::from_value(json!({
            "block_height": "5",
            "validators": [{
                "address": "C5C0BEEAC8B37ED52F6A675EE2154D926A88E3EC",
                "pub_key": { "type": "tendermint/PubKeySecp256k1", "value": "AqBVHHkyOfiie29Wrez6hMvC644kbZfPgXA1jFEs7Uwq" },
                "voting_power": "1000",
                "proposer_priority": "0"
            }],
            "count": "1",
            "total": "1"
        }))
        .unwrap();
        let page = res.into_page().unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.validators[0].pub_key.len(), 33);
        assert_eq!(page.validators[0].pub_key[0], 0x02);
    }

    #[test]
    fn bad_time_is_decode_error() {
        assert!(matches!(
            parse_block_time("yesterday"),
            Err(IndexerError::Decode(_))
        ));
    }
}
