//! Consensus-side staking event classifier.
//!
//! Raw ABCI events are mapped to [`StakingEventType`] through a static table
//! keyed by the event type (`<operation>_success` / `<operation>_failure`).
//! Unknown types are skipped. A recognised event missing a required attribute
//! fails the whole block.

use crate::address::{cmp_pubkey_hex_to_evm_address, normalize_hex, same_address};
use crate::error::IndexerError;
use crate::types::{ClStakingEvent, RawEvent, StakingEventType};

pub const ATTR_ERROR_CODE: &str = "error_code";
pub const ATTR_TX_HASH: &str = "tx_hash";
pub const ATTR_VALIDATOR_CMP_PUBKEY: &str = "validator_cmp_pubkey";
pub const ATTR_AMOUNT: &str = "amount";
pub const ATTR_SENDER_ADDRESS: &str = "sender_address";
pub const ATTR_DELEGATOR_ADDRESS: &str = "delegator_addr";

pub const EVENT_DELEGATE_SUCCESS: &str = "delegate_success";
pub const EVENT_UNDELEGATE_SUCCESS: &str = "undelegate_success";

const EVENT_TABLE: &[(&str, StakingEventType)] = &[
    ("set_operator", StakingEventType::SetOperator),
    ("unset_operator", StakingEventType::UnsetOperator),
    ("set_withdrawal_address", StakingEventType::SetWithdrawalAddress),
    ("set_reward_address", StakingEventType::SetRewardAddress),
    ("update_validator_commission", StakingEventType::UpdateValidatorCommission),
    ("create_validator", StakingEventType::CreateValidator),
    ("delegate", StakingEventType::Stake),
    ("redelegate", StakingEventType::Redelegate),
    ("undelegate", StakingEventType::Unstake),
    ("unjail", StakingEventType::Unjail),
];

/// Look up the base domain type of a raw event type.
pub fn base_type(raw_kind: &str) -> Option<StakingEventType> {
    let operation = raw_kind
        .strip_suffix("_success")
        .or_else(|| raw_kind.strip_suffix("_failure"))?;
    EVENT_TABLE
        .iter()
        .find(|(name, _)| *name == operation)
        .map(|(_, t)| *t)
}

fn require<'a>(
    event: &'a RawEvent,
    event_type: StakingEventType,
    key: &str,
) -> Result<&'a str, IndexerError> {
    event.get(key).ok_or_else(|| IndexerError::MissingAttribute {
        event: event_type.to_string(),
        attribute: key.to_string(),
    })
}

/// Resolve the final type of a recognised event, re-tagging it as
/// "on-behalf" when the sender is not the delegator (or, for unjail, not the
/// validator owning the key).
fn resolve_type(
    event: &RawEvent,
    base: StakingEventType,
) -> Result<StakingEventType, IndexerError> {
    let acting_as = match base {
        StakingEventType::Stake | StakingEventType::Redelegate | StakingEventType::Unstake => {
            require(event, base, ATTR_DELEGATOR_ADDRESS)?.to_string()
        }
        StakingEventType::Unjail => {
            let key = require(event, base, ATTR_VALIDATOR_CMP_PUBKEY)?;
            cmp_pubkey_hex_to_evm_address(key)?
        }
        other => return Ok(other),
    };

    let sender = require(event, base, ATTR_SENDER_ADDRESS)?;
    if same_address(&acting_as, sender) {
        Ok(base)
    } else {
        Ok(base.on_behalf().unwrap_or(base))
    }
}

/// Classify a single raw event. `Ok(None)` for event types outside the table.
pub fn classify_event(
    height: u64,
    event_index: u32,
    event: &RawEvent,
) -> Result<Option<ClStakingEvent>, IndexerError> {
    let Some(base) = base_type(&event.kind) else {
        return Ok(None);
    };

    let event_type = resolve_type(event, base)?;
    let error_code = event.get(ATTR_ERROR_CODE);

    Ok(Some(ClStakingEvent {
        block_height: height,
        event_index,
        el_tx_hash: normalize_hex(event.get(ATTR_TX_HASH).unwrap_or_default()),
        event_type,
        status_ok: error_code.is_none(),
        error_code: error_code.unwrap_or_default().to_string(),
        amount: event.get(ATTR_AMOUNT).unwrap_or_default().to_string(),
    }))
}

/// Classify every event of one block. Either the whole block classifies or
/// an error is returned; partial results are never produced.
pub fn classify_block(
    height: u64,
    events: &[RawEvent],
) -> Result<Vec<ClStakingEvent>, IndexerError> {
    let mut out = Vec::new();
    for (idx, event) in events.iter().enumerate() {
        if let Some(classified) = classify_event(height, idx as u32, event)? {
            out.push(classified);
        }
    }
    Ok(out)
}
