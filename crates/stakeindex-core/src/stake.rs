//! Total-stake accounting.
//!
//! [`StakeLedger`] is the running total carried between batches. It is seeded
//! from the latest persisted point at start-up, passed into each batch and
//! replaced by the returned value only once that batch has committed.

use std::collections::{BTreeMap, HashMap};

use crate::classifier::{ATTR_AMOUNT, EVENT_DELEGATE_SUCCESS, EVENT_UNDELEGATE_SUCCESS};
use crate::error::IndexerError;
use crate::types::{PersistedStakeChange, RawEvent, StakingEventType, TotalStakeHist, TotalStakePoint};

/// Genesis seed of the total-stake series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeGenesis {
    /// Total stake at genesis, in gwei.
    pub amount: i64,
    /// Unix seconds.
    pub time: i64,
    /// Anchor block of the history series.
    pub block: u64,
}

impl Default for StakeGenesis {
    fn default() -> Self {
        Self {
            amount: 8_000_000,
            // 2025-01-19T15:00:00Z
            time: 1_737_298_800,
            block: 1,
        }
    }
}

impl StakeGenesis {
    pub fn point(&self) -> TotalStakePoint {
        TotalStakePoint {
            updated_at: self.time,
            amount: self.amount,
        }
    }

    pub fn hist(&self) -> TotalStakeHist {
        TotalStakeHist {
            block: self.block,
            time: self.time,
            amount: self.amount,
        }
    }
}

/// Parse a stake amount attribute. An empty payload counts as zero.
pub fn parse_stake_amount(raw: &str) -> Result<i64, IndexerError> {
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse::<i64>()
        .map_err(|e| IndexerError::Decode(format!("parse amount '{raw}' failed: {e}")))
}

/// Signed stake delta carried by one raw consensus event, if it is a
/// successful delegate or undelegate with a non-empty amount.
pub fn raw_event_delta(event: &RawEvent) -> Result<Option<i64>, IndexerError> {
    let sign = match event.kind.as_str() {
        EVENT_DELEGATE_SUCCESS => 1,
        EVENT_UNDELEGATE_SUCCESS => -1,
        _ => return Ok(None),
    };
    match event.get(ATTR_AMOUNT) {
        None | Some("") => Ok(None),
        Some(raw) => Ok(Some(sign * parse_stake_amount(raw)?)),
    }
}

/// Net stake change per height, in ascending height order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StakeDeltas(BTreeMap<u64, i64>);

impl StakeDeltas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, height: u64, delta: i64) -> Result<(), IndexerError> {
        let slot = self.0.entry(height).or_insert(0);
        *slot = slot
            .checked_add(delta)
            .ok_or_else(|| IndexerError::Decode(format!("stake delta overflow at block {height}")))?;
        Ok(())
    }

    /// Add every successful delegate/undelegate event of a block.
    pub fn add_block(&mut self, height: u64, events: &[RawEvent]) -> Result<(), IndexerError> {
        for event in events {
            if let Some(delta) = raw_event_delta(event)? {
                self.add(height, delta)?;
            }
        }
        Ok(())
    }

    pub fn heights(&self) -> Vec<u64> {
        self.0.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, i64)> + '_ {
        self.0.iter().map(|(h, d)| (*h, *d))
    }
}

/// Collect deltas and block times from persisted stake/unstake rows.
pub fn persisted_deltas(
    changes: &[PersistedStakeChange],
) -> Result<(StakeDeltas, HashMap<u64, i64>), IndexerError> {
    let mut deltas = StakeDeltas::new();
    let mut times = HashMap::new();
    for change in changes {
        let amount = parse_stake_amount(&change.amount)?;
        let delta = match change.event_type {
            StakingEventType::Stake => amount,
            StakingEventType::Unstake => -amount,
            _ => continue,
        };
        let time = change.block_time.ok_or(IndexerError::MissingBlockTime {
            height: change.block_height,
        })?;
        deltas.add(change.block_height, delta)?;
        times.insert(change.block_height, time);
    }
    Ok((deltas, times))
}

/// The running total stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeLedger {
    total: i64,
}

impl StakeLedger {
    pub fn seeded(total: i64) -> Self {
        Self { total }
    }

    pub fn total(&self) -> i64 {
        self.total
    }

    fn step(&mut self, height: u64, delta: i64) -> Result<i64, IndexerError> {
        self.total = self
            .total
            .checked_add(delta)
            .ok_or_else(|| IndexerError::Decode(format!("total stake overflow at block {height}")))?;
        Ok(self.total)
    }

    /// Apply `deltas` in ascending height order, emitting one point per
    /// height keyed by its block time. Heights sharing a block second collapse
    /// into the later value. A height without a known time is an error.
    pub fn apply(
        self,
        deltas: &StakeDeltas,
        times: &HashMap<u64, i64>,
    ) -> Result<(StakeLedger, Vec<TotalStakePoint>), IndexerError> {
        let mut next = self;
        let mut points: Vec<TotalStakePoint> = Vec::new();
        for (height, delta) in deltas.iter() {
            let time = *times
                .get(&height)
                .ok_or(IndexerError::MissingBlockTime { height })?;
            let amount = next.step(height, delta)?;
            match points.last_mut() {
                Some(last) if last.updated_at == time => last.amount = amount,
                _ => points.push(TotalStakePoint {
                    updated_at: time,
                    amount,
                }),
            }
        }
        Ok((next, points))
    }

    /// Same running sum, anchored by block height for the history series.
    pub fn apply_hist(
        self,
        deltas: &StakeDeltas,
        times: &HashMap<u64, i64>,
    ) -> Result<(StakeLedger, Vec<TotalStakeHist>), IndexerError> {
        let mut next = self;
        let mut rows: Vec<TotalStakeHist> = Vec::new();
        for (height, delta) in deltas.iter() {
            let time = *times
                .get(&height)
                .ok_or(IndexerError::MissingBlockTime { height })?;
            let amount = next.step(height, delta)?;
            let row = TotalStakeHist {
                block: height,
                time,
                amount,
            };
            match rows.last_mut() {
                Some(last) if last.time == time => *last = row,
                _ => rows.push(row),
            }
        }
        Ok((next, rows))
    }
}
