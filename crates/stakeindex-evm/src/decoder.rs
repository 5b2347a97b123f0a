//! Staking-contract log decoder.
//!
//! Every staking event carries its parameters in the data section; only
//! topic0 (the event signature hash) is used for dispatch. Addresses are
//! stored lower-case; validator keys are turned into EVM addresses.

use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::{sol, SolEvent};

use stakeindex_core::address::{cmp_pubkey_to_evm_address, normalize_hex};
use stakeindex_core::error::IndexerError;
use stakeindex_core::types::{ElStakingEvent, RawLog, StakingEventType};

sol! {
    event CreateValidator(
        bytes validatorCmpPubkey,
        string moniker,
        uint256 stakeAmount,
        uint32 commissionRate,
        uint32 maxCommissionRate,
        uint32 maxCommissionChangeRate,
        uint8 supportsUnlocked,
        address operatorAddress,
        bytes data
    );

    event SetWithdrawalAddress(address delegator, bytes32 executionAddress);

    event SetRewardAddress(address delegator, bytes32 executionAddress);

    event UpdateValidatorCommission(bytes validatorCmpPubkey, uint32 commissionRate);

    event Deposit(
        address delegator,
        bytes validatorCmpPubkey,
        uint256 stakeAmount,
        uint256 stakingPeriod,
        uint256 delegationId,
        address operatorAddress,
        bytes data
    );

    event Redelegate(
        address delegator,
        bytes validatorSrcCmpPubkey,
        bytes validatorDstCmpPubkey,
        uint256 delegationId,
        address operatorAddress,
        uint256 amount
    );

    event Withdraw(
        address delegator,
        bytes validatorCmpPubkey,
        uint256 stakeAmount,
        uint256 delegationId,
        address operatorAddress,
        bytes data
    );

    event Unjail(address unjailer, bytes validatorCmpPubkey, bytes data);

    event SetOperator(address delegator, address operator);

    event UnsetOperator(address delegator);
}

/// topic0 of every event the execution-side indexer subscribes to.
pub fn staking_topics() -> [B256; 10] {
    [
        CreateValidator::SIGNATURE_HASH,
        SetWithdrawalAddress::SIGNATURE_HASH,
        SetRewardAddress::SIGNATURE_HASH,
        UpdateValidatorCommission::SIGNATURE_HASH,
        Deposit::SIGNATURE_HASH,
        Redelegate::SIGNATURE_HASH,
        Withdraw::SIGNATURE_HASH,
        Unjail::SIGNATURE_HASH,
        SetOperator::SIGNATURE_HASH,
        UnsetOperator::SIGNATURE_HASH,
    ]
}

fn lower(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

fn validator(pubkey: &Bytes) -> Result<String, IndexerError> {
    cmp_pubkey_to_evm_address(&pubkey[..])
}

/// Pick the on-behalf variant when the caller is not the principal.
fn on_behalf_if(base: StakingEventType, caller: &Address, principal: &Address) -> StakingEventType {
    if caller == principal {
        base
    } else {
        base.on_behalf().unwrap_or(base)
    }
}

fn decode<E: SolEvent>(topics: &[B256], data: &[u8]) -> Result<E, IndexerError> {
    E::decode_raw_log(topics.iter().copied(), data, true)
        .map_err(|e| IndexerError::Decode(format!("{}: {e}", E::SIGNATURE)))
}

fn parse_topic(raw: &str) -> Result<B256, IndexerError> {
    raw.parse::<B256>()
        .map_err(|e| IndexerError::Decode(format!("topic '{raw}': {e}")))
}

/// Decoded fields before the log position is attached.
#[derive(Default)]
struct Decoded {
    address: String,
    src_validator: String,
    dst_validator: String,
    dst_address: String,
}

/// Decode one staking-contract log. `Ok(None)` for removed logs and for
/// topics outside the staking set.
pub fn decode_log(log: &RawLog) -> Result<Option<ElStakingEvent>, IndexerError> {
    if log.removed {
        return Ok(None);
    }
    let topics = log
        .topics
        .iter()
        .map(|t| parse_topic(t))
        .collect::<Result<Vec<_>, _>>()?;
    let Some(topic0) = topics.first().copied() else {
        return Ok(None);
    };
    let data = hex::decode(log.data.strip_prefix("0x").unwrap_or(&log.data))
        .map_err(|e| IndexerError::Decode(format!("log data: {e}")))?;

    let (event_type, fields) = if topic0 == SetOperator::SIGNATURE_HASH {
        let ev: SetOperator = decode(&topics, &data)?;
        (
            StakingEventType::SetOperator,
            Decoded {
                address: lower(&ev.delegator),
                dst_address: lower(&ev.operator),
                ..Default::default()
            },
        )
    } else if topic0 == UnsetOperator::SIGNATURE_HASH {
        let ev: UnsetOperator = decode(&topics, &data)?;
        (
            StakingEventType::UnsetOperator,
            Decoded {
                address: lower(&ev.delegator),
                ..Default::default()
            },
        )
    } else if topic0 == SetWithdrawalAddress::SIGNATURE_HASH {
        let ev: SetWithdrawalAddress = decode(&topics, &data)?;
        (
            StakingEventType::SetWithdrawalAddress,
            Decoded {
                address: lower(&ev.delegator),
                dst_address: lower(&Address::from_word(ev.executionAddress)),
                ..Default::default()
            },
        )
    } else if topic0 == SetRewardAddress::SIGNATURE_HASH {
        let ev: SetRewardAddress = decode(&topics, &data)?;
        (
            StakingEventType::SetRewardAddress,
            Decoded {
                address: lower(&ev.delegator),
                dst_address: lower(&Address::from_word(ev.executionAddress)),
                ..Default::default()
            },
        )
    } else if topic0 == UpdateValidatorCommission::SIGNATURE_HASH {
        let ev: UpdateValidatorCommission = decode(&topics, &data)?;
        (
            StakingEventType::UpdateValidatorCommission,
            Decoded {
                address: validator(&ev.validatorCmpPubkey)?,
                ..Default::default()
            },
        )
    } else if topic0 == CreateValidator::SIGNATURE_HASH {
        let ev: CreateValidator = decode(&topics, &data)?;
        let operator = lower(&ev.operatorAddress);
        (
            StakingEventType::CreateValidator,
            Decoded {
                address: operator.clone(),
                dst_validator: operator,
                ..Default::default()
            },
        )
    } else if topic0 == Deposit::SIGNATURE_HASH {
        let ev: Deposit = decode(&topics, &data)?;
        (
            on_behalf_if(StakingEventType::Stake, &ev.operatorAddress, &ev.delegator),
            Decoded {
                address: lower(&ev.operatorAddress),
                dst_validator: validator(&ev.validatorCmpPubkey)?,
                ..Default::default()
            },
        )
    } else if topic0 == Redelegate::SIGNATURE_HASH {
        let ev: Redelegate = decode(&topics, &data)?;
        (
            on_behalf_if(StakingEventType::Redelegate, &ev.operatorAddress, &ev.delegator),
            Decoded {
                address: lower(&ev.operatorAddress),
                src_validator: validator(&ev.validatorSrcCmpPubkey)?,
                dst_validator: validator(&ev.validatorDstCmpPubkey)?,
                ..Default::default()
            },
        )
    } else if topic0 == Withdraw::SIGNATURE_HASH {
        let ev: Withdraw = decode(&topics, &data)?;
        (
            on_behalf_if(StakingEventType::Unstake, &ev.operatorAddress, &ev.delegator),
            Decoded {
                address: lower(&ev.operatorAddress),
                dst_validator: validator(&ev.validatorCmpPubkey)?,
                ..Default::default()
            },
        )
    } else if topic0 == Unjail::SIGNATURE_HASH {
        let ev: Unjail = decode(&topics, &data)?;
        let owner = validator(&ev.validatorCmpPubkey)?;
        let unjailer = lower(&ev.unjailer);
        let event_type = if unjailer == owner {
            StakingEventType::Unjail
        } else {
            StakingEventType::UnjailOnBehalf
        };
        (
            event_type,
            Decoded {
                address: unjailer,
                dst_validator: owner,
                ..Default::default()
            },
        )
    } else {
        return Ok(None);
    };

    Ok(Some(ElStakingEvent {
        tx_hash: normalize_hex(&log.tx_hash),
        log_index: log.log_index,
        block_height: log.block_number,
        event_type,
        address: fields.address,
        src_validator: fields.src_validator,
        dst_validator: fields.dst_validator,
        dst_address: fields.dst_address,
    }))
}

/// Decode every log, keeping block/log order.
pub fn decode_logs(logs: &[RawLog]) -> Result<Vec<ElStakingEvent>, IndexerError> {
    let mut out = Vec::with_capacity(logs.len());
    for log in logs {
        if let Some(event) = decode_log(log)? {
            out.push(event);
        }
    }
    out.sort_by_key(|e| (e.block_height, e.log_index));
    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy_primitives::{address, U256};

    // secp256k1 generator G, compressed.
    pub(crate) const KEY_G: &str =
        "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
    pub(crate) const ADDR_G: &str = "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf";

    pub(crate) fn key_g() -> Bytes {
        Bytes::from(hex::decode(KEY_G).unwrap())
    }

    pub(crate) fn raw_log<E: SolEvent>(event: &E, block: u64, index: u64) -> RawLog {
        let encoded = event.encode_log_data();
        RawLog {
            address: "0xcccccc0000000000000000000000000000000001".into(),
            topics: encoded
                .topics()
                .iter()
                .map(|t| format!("0x{}", hex::encode(t)))
                .collect(),
            data: format!("0x{}", hex::encode(&encoded.data)),
            block_number: block,
            tx_hash: format!("0x{:064x}", block * 1000 + index),
            log_index: index,
            removed: false,
        }
    }

    #[test]
    fn topics_are_distinct() {
        let topics = staking_topics();
        for (i, a) in topics.iter().enumerate() {
            for b in &topics[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(
            SetOperator::SIGNATURE,
            "SetOperator(address,address)"
        );
    }

    #[test]
    fn deposit_by_delegator_is_stake() {
        let delegator = address!("00000000000000000000000000000000000A11CE");
        let ev = Deposit {
            delegator,
            validatorCmpPubkey: key_g(),
            stakeAmount: U256::from(1_024u64),
            stakingPeriod: U256::ZERO,
            delegationId: U256::ZERO,
            operatorAddress: delegator,
            data: Bytes::new(),
        };
        let out = decode_log(&raw_log(&ev, 7, 2)).unwrap().unwrap();
        assert_eq!(out.event_type, StakingEventType::Stake);
        assert_eq!(out.address, "0x00000000000000000000000000000000000a11ce");
        assert_eq!(out.dst_validator, ADDR_G);
        assert_eq!(out.block_height, 7);
        assert_eq!(out.log_index, 2);
    }

    #[test]
    fn withdraw_by_operator_is_on_behalf() {
        let ev = Withdraw {
            delegator: address!("00000000000000000000000000000000000A11CE"),
            validatorCmpPubkey: key_g(),
            stakeAmount: U256::from(5u64),
            delegationId: U256::ZERO,
            operatorAddress: address!("0000000000000000000000000000000000000B0B"),
            data: Bytes::new(),
        };
        let out = decode_log(&raw_log(&ev, 1, 0)).unwrap().unwrap();
        assert_eq!(out.event_type, StakingEventType::UnstakeOnBehalf);
        assert_eq!(out.address, "0x0000000000000000000000000000000000000b0b");
    }

    #[test]
    fn redelegate_resolves_both_validators() {
        let delegator = address!("00000000000000000000000000000000000A11CE");
        let ev = Redelegate {
            delegator,
            validatorSrcCmpPubkey: key_g(),
            validatorDstCmpPubkey: key_g(),
            delegationId: U256::from(3u64),
            operatorAddress: delegator,
            amount: U256::from(9u64),
        };
        let out = decode_log(&raw_log(&ev, 1, 0)).unwrap().unwrap();
        assert_eq!(out.event_type, StakingEventType::Redelegate);
        assert_eq!(out.src_validator, ADDR_G);
        assert_eq!(out.dst_validator, ADDR_G);
    }

    #[test]
    fn unjail_compares_with_key_owner() {
        let owner: Address = ADDR_G.parse().unwrap();
        let own = Unjail {
            unjailer: owner,
            validatorCmpPubkey: key_g(),
            data: Bytes::new(),
        };
        let out = decode_log(&raw_log(&own, 1, 0)).unwrap().unwrap();
        assert_eq!(out.event_type, StakingEventType::Unjail);

        let other = Unjail {
            unjailer: address!("0000000000000000000000000000000000000B0B"),
            validatorCmpPubkey: key_g(),
            data: Bytes::new(),
        };
        let out = decode_log(&raw_log(&other, 1, 1)).unwrap().unwrap();
        assert_eq!(out.event_type, StakingEventType::UnjailOnBehalf);
        assert_eq!(out.dst_validator, ADDR_G);
    }

    #[test]
    fn execution_address_takes_low_20_bytes() {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&[0xAB; 20]);
        let ev = SetRewardAddress {
            delegator: address!("00000000000000000000000000000000000A11CE"),
            executionAddress: B256::from(word),
        };
        let out = decode_log(&raw_log(&ev, 1, 0)).unwrap().unwrap();
        assert_eq!(out.event_type, StakingEventType::SetRewardAddress);
        assert_eq!(out.dst_address, format!("0x{}", "ab".repeat(20)));
    }

    #[test]
    fn create_validator_uses_operator() {
        let operator = address!("00000000000000000000000000000000000000C0");
        let ev = CreateValidator {
            validatorCmpPubkey: key_g(),
            moniker: "node-0".into(),
            stakeAmount: U256::from(1u64),
            commissionRate: 1_000,
            maxCommissionRate: 5_000,
            maxCommissionChangeRate: 100,
            supportsUnlocked: 1,
            operatorAddress: operator,
            data: Bytes::new(),
        };
        let out = decode_log(&raw_log(&ev, 1, 0)).unwrap().unwrap();
        assert_eq!(out.address, "0x00000000000000000000000000000000000000c0");
        assert_eq!(out.dst_validator, out.address);
    }

    #[test]
    fn unknown_and_removed_logs_are_skipped() {
        let mut log = raw_log(
            &UnsetOperator {
                delegator: Address::ZERO,
            },
            1,
            0,
        );
        log.removed = true;
        assert!(decode_log(&log).unwrap().is_none());

        log.removed = false;
        log.topics = vec![format!("0x{}", "11".repeat(32))];
        assert!(decode_log(&log).unwrap().is_none());

        log.topics.clear();
        assert!(decode_log(&log).unwrap().is_none());
    }

    #[test]
    fn bad_validator_key_is_an_error() {
        let ev = UpdateValidatorCommission {
            validatorCmpPubkey: Bytes::from(vec![0x02; 12]),
            commissionRate: 10,
        };
        assert!(matches!(
            decode_log(&raw_log(&ev, 1, 0)),
            Err(IndexerError::InvalidPubkey(_))
        ));
    }
}
