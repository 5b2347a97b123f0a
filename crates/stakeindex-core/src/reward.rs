//! Per-address withdrawal aggregation with arbitrary-precision amounts.

use std::collections::HashMap;

use num_bigint::BigUint;

use crate::address::normalize_hex;
use crate::types::{Reward, RewardDelta, Withdrawal};

/// Default number of distinct addresses accumulated before a flush.
pub const DEFAULT_REWARD_FLUSH_SIZE: usize = 100;

/// In-memory accumulator for one batch.
#[derive(Debug)]
pub struct RewardAccumulator {
    entries: HashMap<String, (BigUint, u64)>,
    flush_size: usize,
}

impl RewardAccumulator {
    pub fn new(flush_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            flush_size: flush_size.max(1),
        }
    }

    pub fn add(&mut self, withdrawal: &Withdrawal, height: u64) {
        let entry = self
            .entries
            .entry(normalize_hex(&withdrawal.address))
            .or_insert_with(|| (BigUint::default(), height));
        entry.0 += withdrawal.amount;
        entry.1 = entry.1.max(height);
    }

    pub fn add_block(&mut self, withdrawals: &[Withdrawal], height: u64) {
        for w in withdrawals {
            self.add(w, height);
        }
    }

    /// `true` once the accumulator holds `flush_size` addresses.
    pub fn should_flush(&self) -> bool {
        self.entries.len() >= self.flush_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take every accumulated delta, ordered by address.
    pub fn drain(&mut self) -> Vec<RewardDelta> {
        let mut out: Vec<_> = self
            .entries
            .drain()
            .map(|(address, (amount, height))| RewardDelta {
                address,
                amount,
                height,
            })
            .collect();
        out.sort_by(|a, b| a.address.cmp(&b.address));
        out
    }
}

/// Apply a delta on top of the stored total: amounts add up, the height keeps
/// the larger of the two.
pub fn merge_reward(stored: Option<&Reward>, delta: &RewardDelta) -> Reward {
    match stored {
        Some(s) => Reward {
            address: delta.address.clone(),
            amount: &s.amount + &delta.amount,
            last_update_height: s.last_update_height.max(delta.height),
        },
        None => Reward {
            address: delta.address.clone(),
            amount: delta.amount.clone(),
            last_update_height: delta.height,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(addr: &str, amount: u64) -> Withdrawal {
        Withdrawal {
            address: addr.into(),
            amount,
        }
    }

    #[test]
    fn accumulates_case_insensitively() {
        let mut acc = RewardAccumulator::new(10);
        acc.add(&w("0xAAAA", 5), 1);
        acc.add(&w("0xaaaa", 7), 3);
        let out = acc.drain();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].address, "0xaaaa");
        assert_eq!(out[0].amount, BigUint::from(12u32));
        assert_eq!(out[0].height, 3);
        assert!(acc.is_empty());
    }

    #[test]
    fn exceeds_u64_without_overflow() {
        let mut acc = RewardAccumulator::new(10);
        for h in 0..4 {
            acc.add(&w("0xbeef", u64::MAX), h);
        }
        let out = acc.drain();
        let expected = BigUint::from(u64::MAX) * 4u32;
        assert_eq!(out[0].amount, expected);
        assert!(out[0].amount > BigUint::from(u64::MAX));
    }

    #[test]
    fn flush_threshold() {
        let mut acc = RewardAccumulator::new(2);
        acc.add(&w("0x01", 1), 1);
        assert!(!acc.should_flush());
        acc.add(&w("0x02", 1), 1);
        assert!(acc.should_flush());
    }

    #[test]
    fn merge_adds_and_keeps_max_height() {
        let stored = Reward {
            address: "0xaa".into(),
            amount: BigUint::from(u64::MAX),
            last_update_height: 50,
        };
        let delta = RewardDelta {
            address: "0xaa".into(),
            amount: BigUint::from(1u32),
            height: 40,
        };
        let merged = merge_reward(Some(&stored), &delta);
        assert_eq!(merged.amount, BigUint::from(u64::MAX) + 1u32);
        assert_eq!(merged.last_update_height, 50);
    }
}
