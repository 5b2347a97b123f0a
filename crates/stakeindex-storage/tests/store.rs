//! Batch writers and read queries against an in-memory SQLite store.

use num_bigint::BigUint;

use stakeindex_core::checkpoint::CheckpointStore;
use stakeindex_core::store::IndexStore;
use stakeindex_core::types::{
    ClStakingEvent, ConsensusBlock, ElStakingEvent, ExecutionBlock, RewardDelta,
    StakingEventType, TotalStakeHist, TotalStakePoint, ValidatorUptime, ValidatorVote,
};
use stakeindex_storage::{SqlStore, StakeInterval};

async fn store_with(indexers: &[&str]) -> SqlStore {
    let store = SqlStore::in_memory().await.unwrap();
    for name in indexers {
        store.setup(name).await.unwrap();
    }
    store
}

fn uptime(addr: &str, from: u64, to: u64, votes: u64) -> ValidatorUptime {
    ValidatorUptime {
        evm_address: addr.into(),
        active_from: from,
        active_to: to,
        vote_count: votes,
    }
}

fn cl_block(height: u64, time: i64) -> ConsensusBlock {
    ConsensusBlock {
        height,
        hash: format!("0x{height:064x}"),
        proposer: "F00D".into(),
        time,
    }
}

fn cl_event(height: u64, index: u32, tx: &str, kind: StakingEventType, ok: bool, amount: &str) -> ClStakingEvent {
    ClStakingEvent {
        block_height: height,
        event_index: index,
        el_tx_hash: tx.into(),
        event_type: kind,
        status_ok: ok,
        error_code: if ok { String::new() } else { "insufficient_balance".into() },
        amount: amount.into(),
    }
}

fn el_event(height: u64, tx: &str, addr: &str, kind: StakingEventType) -> ElStakingEvent {
    ElStakingEvent {
        tx_hash: tx.into(),
        log_index: 0,
        block_height: height,
        event_type: kind,
        address: addr.into(),
        src_validator: String::new(),
        dst_validator: "0x00000000000000000000000000000000000000aa".into(),
        dst_address: String::new(),
    }
}

// ── Uptime ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn uptime_upsert_extends_or_resets() {
    let store = store_with(&["cl_validator_uptime"]).await;

    store
        .commit_validator_uptimes(
            "cl_validator_uptime",
            &[uptime("0x1111", 1, 10, 5), uptime("0x2222", 1, 10, 10)],
            10,
        )
        .await
        .unwrap();
    store
        .commit_validator_uptimes(
            "cl_validator_uptime",
            &[
                uptime("0x1111", 11, 20, 10),
                uptime("0x2222", 12, 20, 8),
                uptime("0x3333", 11, 20, 10),
            ],
            20,
        )
        .await
        .unwrap();

    assert_eq!(
        store.validator_uptime("0x1111").await.unwrap().unwrap(),
        uptime("0x1111", 1, 20, 15)
    );
    assert_eq!(
        store.validator_uptime("0x2222").await.unwrap().unwrap(),
        uptime("0x2222", 12, 20, 8)
    );
    assert_eq!(
        store.validator_uptime("0x3333").await.unwrap().unwrap(),
        uptime("0x3333", 11, 20, 10)
    );
    assert_eq!(store.validator_uptimes().await.unwrap().len(), 3);
    assert_eq!(store.load("cl_validator_uptime").await.unwrap(), Some(20));
}

// ── Votes ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn votes_are_pruned_below_window() {
    let store = store_with(&["cl_validator_vote"]).await;
    let votes: Vec<_> = (1..=10)
        .flat_map(|h| {
            let mut v = vec![ValidatorVote {
                validator: "0xaaaa".into(),
                block_height: h,
            }];
            if h % 2 == 0 {
                v.push(ValidatorVote {
                    validator: "0xbbbb".into(),
                    block_height: h,
                });
            }
            v
        })
        .collect();

    store
        .commit_validator_votes("cl_validator_vote", &votes, 6, 10)
        .await
        .unwrap();
    // Replaying the same evidence changes nothing.
    store
        .commit_validator_votes("cl_validator_vote", &votes, 6, 10)
        .await
        .unwrap();

    let counts = store.validator_vote_counts(&[]).await.unwrap();
    assert_eq!(counts.get("0xaaaa"), Some(&5));
    assert_eq!(counts.get("0xbbbb"), Some(&3));

    let only_b = store
        .validator_vote_counts(&["0xBBBB".to_string()])
        .await
        .unwrap();
    assert_eq!(only_b.len(), 1);
    assert_eq!(only_b.get("0xbbbb"), Some(&3));
}

// ── Rewards ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn rewards_exceed_u64() {
    let store = store_with(&["el_reward"]).await;
    let addr = "0x00000000000000000000000000000000000000cc";
    let delta = |height| RewardDelta {
        address: addr.into(),
        amount: BigUint::from(u64::MAX),
        height,
    };

    store.commit_rewards("el_reward", &[delta(5)], 5).await.unwrap();
    store.commit_rewards("el_reward", &[delta(9)], 9).await.unwrap();
    store.commit_rewards("el_reward", &[delta(7)], 12).await.unwrap();

    let reward = store.reward(addr).await.unwrap().unwrap();
    assert_eq!(reward.amount, BigUint::from(u64::MAX) * 3u32);
    assert_eq!(reward.amount.to_string(), "55340232221128654845");
    assert_eq!(reward.last_update_height, 9);
    assert!(store.reward("0x0000000000000000000000000000000000000001").await.unwrap().is_none());
}

#[tokio::test]
async fn empty_reward_flush_still_advances_checkpoint() {
    let store = store_with(&["el_reward"]).await;
    store.commit_rewards("el_reward", &[], 100).await.unwrap();
    assert_eq!(store.load("el_reward").await.unwrap(), Some(100));
}

// ── Total stake ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn total_stake_seed_and_replay() {
    let store = store_with(&["cl_total_stake"]).await;
    let genesis = TotalStakePoint {
        updated_at: 1_000,
        amount: 8_000_000,
    };
    store.seed_total_stake(&genesis).await.unwrap();
    store.seed_total_stake(&genesis).await.unwrap();
    assert_eq!(store.latest_total_stake().await.unwrap(), Some(genesis));

    let points = [
        TotalStakePoint {
            updated_at: 2_000,
            amount: 8_000_100,
        },
        TotalStakePoint {
            updated_at: 3_000,
            amount: 8_000_070,
        },
    ];
    store.commit_total_stakes("cl_total_stake", &points, 30).await.unwrap();
    store.commit_total_stakes("cl_total_stake", &points, 30).await.unwrap();

    assert_eq!(store.all_total_stakes().await.unwrap().len(), 3);
    assert_eq!(store.latest_total_stake().await.unwrap(), Some(points[1]));
}

#[tokio::test]
async fn total_stake_series_windows() {
    let store = store_with(&["cl_total_stake"]).await;
    let day = 86_400;
    let now = 100 * day;
    let points: Vec<_> = [60, 90, 95, 99]
        .iter()
        .enumerate()
        .map(|(i, d)| TotalStakePoint {
            updated_at: d * day,
            amount: 100 + i as i64,
        })
        .collect();
    store.commit_total_stakes("cl_total_stake", &points, 1).await.unwrap();

    let all = store.total_stake_series(StakeInterval::All, now).await.unwrap();
    assert_eq!(all, points);

    // Last point before the cutoff leads the window.
    let week = store.total_stake_series(StakeInterval::SevenDays, now).await.unwrap();
    assert_eq!(week, points[1..].to_vec());

    let day_series = store.total_stake_series(StakeInterval::OneDay, now).await.unwrap();
    assert_eq!(day_series, vec![points[3]]);

    let month = store.total_stake_series(StakeInterval::ThirtyDays, now).await.unwrap();
    assert_eq!(month, points.clone());

    assert_eq!(store.total_stake_at(59 * day).await.unwrap(), None);
}

#[tokio::test]
async fn stake_hist_same_second_keeps_latest_block() {
    let store = store_with(&["cl_total_stake_hist"]).await;
    let genesis = TotalStakeHist {
        block: 1,
        time: 1_000,
        amount: 8_000_000,
    };
    store.seed_total_stake_hist(&genesis).await.unwrap();
    store.seed_total_stake_hist(&genesis).await.unwrap();

    let first = TotalStakeHist {
        block: 10,
        time: 2_000,
        amount: 8_000_050,
    };
    store
        .commit_total_stake_hists("cl_total_stake_hist", &[first], 10)
        .await
        .unwrap();

    let same_second = TotalStakeHist {
        block: 11,
        time: 2_000,
        amount: 8_000_080,
    };
    store
        .commit_total_stake_hists("cl_total_stake_hist", &[same_second], 11)
        .await
        .unwrap();

    assert_eq!(store.latest_total_stake_hist().await.unwrap(), Some(same_second));
}

// ── Staking events ───────────────────────────────────────────────────────────

#[tokio::test]
async fn stake_changes_join_block_time() {
    let store = store_with(&["cl_block", "cl_staking_event"]).await;
    store
        .commit_consensus_blocks("cl_block", &[cl_block(5, 500)], 5)
        .await
        .unwrap();
    let events = [
        cl_event(5, 0, "0xa1", StakingEventType::Stake, true, "100"),
        cl_event(5, 1, "0xa2", StakingEventType::Unstake, false, "100"),
        cl_event(5, 2, "0xa3", StakingEventType::SetOperator, true, ""),
        cl_event(6, 0, "0xa4", StakingEventType::Unstake, true, "40"),
    ];
    store
        .commit_cl_staking_events("cl_staking_event", &events, 6)
        .await
        .unwrap();
    store
        .commit_cl_staking_events("cl_staking_event", &events, 6)
        .await
        .unwrap();

    let changes = store.stake_changes_between(1, 10).await.unwrap();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].event_type, StakingEventType::Stake);
    assert_eq!(changes[0].block_time, Some(500));
    assert_eq!(changes[1].event_type, StakingEventType::Unstake);
    assert_eq!(changes[1].block_time, None);

    let times = store.consensus_block_times(&[5, 6]).await.unwrap();
    assert_eq!(times.get(&5), Some(&500));
    assert!(!times.contains_key(&6));
}

#[tokio::test]
async fn operations_join_and_paginate() {
    let store = store_with(&["cl_staking_event", "el_staking_event"]).await;
    let me = "0x00000000000000000000000000000000000000d1";
    let other = "0x00000000000000000000000000000000000000d2";

    let mut el = Vec::new();
    let mut cl = Vec::new();
    for h in 1..=5u64 {
        let tx = format!("0x{h:064x}");
        el.push(el_event(h, &tx, me, StakingEventType::Stake));
        cl.push(cl_event(h + 1, 0, &tx, StakingEventType::Stake, h != 3, "10"));
    }
    // Execution log without a consensus counterpart yet.
    el.push(el_event(6, &format!("0x{:064x}", 6), me, StakingEventType::Unstake));
    el.push(el_event(7, &format!("0x{:064x}", 7), other, StakingEventType::Stake));
    cl.push(cl_event(8, 0, &format!("0x{:064x}", 7), StakingEventType::Stake, true, "1"));

    store.commit_el_staking_events("el_staking_event", &el, 7).await.unwrap();
    store.commit_cl_staking_events("cl_staking_event", &cl, 8).await.unwrap();

    let first = store.operations(me, 1, 2).await.unwrap();
    assert_eq!(first.total, 5);
    let heights: Vec<_> = first.items.iter().map(|o| o.block_height).collect();
    assert_eq!(heights, vec![5, 4]);

    let second = store.operations(&me.to_uppercase().replace("0X", "0x"), 2, 2).await.unwrap();
    assert_eq!(second.total, 5);
    assert_eq!(second.items[0].block_height, 3);
    assert!(!second.items[0].status_ok);
    assert_eq!(second.items[0].error_code, "insufficient_balance");

    // page 0 behaves as page 1; oversize pages are clamped.
    let clamped = store.operations(me, 0, 1_000).await.unwrap();
    assert_eq!(clamped.items.len(), 5);
    assert_eq!(clamped.items[0].block_height, 5);

    let nobody = store.operations("0x0000000000000000000000000000000000000000", 1, 10).await.unwrap();
    assert_eq!(nobody.total, 0);
    assert!(nobody.items.is_empty());
}

// ── Blocks ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn latest_blocks() {
    let store = store_with(&["cl_block", "el_block"]).await;
    assert!(store.latest_consensus_block().await.unwrap().is_none());

    let blocks: Vec<_> = (1..=3).map(|h| cl_block(h, h as i64 * 10)).collect();
    store.commit_consensus_blocks("cl_block", &blocks, 3).await.unwrap();
    store.commit_consensus_blocks("cl_block", &blocks, 3).await.unwrap();
    assert_eq!(store.latest_consensus_block().await.unwrap(), Some(blocks[2].clone()));

    let el: Vec<_> = (1..=4)
        .map(|h| ExecutionBlock {
            height: h,
            hash: format!("0x{h:064x}"),
            gas_used: 21_000 * h,
            gas_limit: 30_000_000,
            time: h as i64,
            withdrawals: vec![],
        })
        .collect();
    store.commit_execution_blocks("el_block", &el, 4).await.unwrap();

    let latest = store.latest_execution_blocks(2).await.unwrap();
    assert_eq!(latest.len(), 2);
    assert_eq!(latest[0].height, 4);
    assert_eq!(latest[1].height, 3);
    assert_eq!(store.load("el_block").await.unwrap(), Some(4));
}

// ── PostgreSQL ───────────────────────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn postgres_checkpoint_roundtrip() {
    let url = std::env::var("DATABASE_URL").unwrap();
    let store = SqlStore::connect(&url, 2).await.unwrap();
    store.setup("pg_smoke").await.unwrap();
    let before = store.load("pg_smoke").await.unwrap().unwrap();
    store.advance("pg_smoke", before + 1).await.unwrap();
    assert_eq!(store.load("pg_smoke").await.unwrap(), Some(before + 1));
}
