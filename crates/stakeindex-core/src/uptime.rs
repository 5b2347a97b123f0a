//! Validator uptime interval stitching and sliding-window vote evidence.

use std::collections::HashMap;

use crate::address::cmp_pubkey_to_evm_address;
use crate::error::IndexerError;
use crate::types::{ActiveValidator, BlockIdFlag, CommitSignature, ValidatorUptime, ValidatorVote};

/// Default size of the vote window, in blocks.
pub const DEFAULT_VOTE_WINDOW: u64 = 43_200;

/// Resolved active set at one height: CometBFT address → EVM address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveSet {
    by_comet: HashMap<String, String>,
}

impl ActiveSet {
    pub fn resolve(validators: &[ActiveValidator]) -> Result<Self, IndexerError> {
        let mut by_comet = HashMap::with_capacity(validators.len());
        for v in validators {
            let evm = cmp_pubkey_to_evm_address(&v.pub_key)?;
            by_comet.insert(comet_key(&v.address), evm);
        }
        Ok(Self { by_comet })
    }

    pub fn evm_address(&self, comet_address: &str) -> Option<&str> {
        self.by_comet.get(&comet_key(comet_address)).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_comet.iter().map(|(c, e)| (c.as_str(), e.as_str()))
    }

    pub fn len(&self) -> usize {
        self.by_comet.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_comet.is_empty()
    }
}

fn comet_key(address: &str) -> String {
    address.trim_start_matches("0x").to_ascii_uppercase()
}

/// Per-batch interval tracker keyed by CometBFT address.
///
/// Lives for exactly one sub-range; the persisted rows are merged with its
/// output by [`merge_uptime`] (or the equivalent upsert in the store).
#[derive(Debug, Default)]
pub struct UptimeTracker {
    entries: HashMap<String, ValidatorUptime>,
}

impl UptimeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that every member of `active` was in the set at `height`.
    /// A validator not seen at `height - 1` starts a fresh interval.
    pub fn observe_active(&mut self, height: u64, active: &ActiveSet) {
        for (comet, evm) in active.iter() {
            match self.entries.get_mut(comet) {
                Some(entry) if entry.active_to + 1 == height => entry.active_to = height,
                _ => {
                    self.entries.insert(
                        comet.to_string(),
                        ValidatorUptime {
                            evm_address: evm.to_string(),
                            active_from: height,
                            active_to: height,
                            vote_count: 0,
                        },
                    );
                }
            }
        }
    }

    /// Count `commit` signatures of tracked validators.
    pub fn observe_commit(&mut self, signatures: &[CommitSignature]) {
        for sig in signatures {
            if sig.flag != BlockIdFlag::Commit {
                continue;
            }
            if let Some(entry) = self.entries.get_mut(&comet_key(&sig.validator_address)) {
                entry.vote_count += 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume the tracker, returning rows ordered by EVM address.
    pub fn into_rows(self) -> Vec<ValidatorUptime> {
        let mut rows: Vec<_> = self.entries.into_values().collect();
        rows.sort_by(|a, b| a.evm_address.cmp(&b.evm_address));
        rows
    }
}

/// Combine a stored uptime row with an incoming one.
///
/// The incoming interval extends the stored one only when it starts right
/// after it; otherwise the incoming row replaces interval and count.
pub fn merge_uptime(stored: Option<&ValidatorUptime>, incoming: &ValidatorUptime) -> ValidatorUptime {
    match stored {
        Some(s) if s.active_to + 1 == incoming.active_from => ValidatorUptime {
            evm_address: incoming.evm_address.clone(),
            active_from: s.active_from,
            active_to: incoming.active_to,
            vote_count: s.vote_count + incoming.vote_count,
        },
        _ => incoming.clone(),
    }
}

/// Vote evidence rows for one height: one per `commit` or `nil` signature.
/// A signer absent from the active set is a data inconsistency.
pub fn vote_rows(
    height: u64,
    active: &ActiveSet,
    signatures: &[CommitSignature],
) -> Result<Vec<ValidatorVote>, IndexerError> {
    let mut rows = Vec::new();
    for sig in signatures {
        if !matches!(sig.flag, BlockIdFlag::Commit | BlockIdFlag::Nil) {
            continue;
        }
        let evm = active
            .evm_address(&sig.validator_address)
            .ok_or_else(|| IndexerError::UnknownValidator {
                validator: sig.validator_address.clone(),
                height,
            })?;
        rows.push(ValidatorVote {
            validator: evm.to_string(),
            block_height: height,
        });
    }
    Ok(rows)
}

/// Lowest height kept in a window of `window` blocks ending at `height`.
pub fn window_floor(height: u64, window: u64) -> u64 {
    (height + 1).saturating_sub(window)
}

/// Uptime percentage for `votes` over a window of `window` blocks.
pub fn uptime_percent(votes: u64, window: u64) -> f64 {
    if window == 0 {
        return 0.0;
    }
    100.0 * votes as f64 / window as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pairs: &[(&str, &str)]) -> ActiveSet {
        ActiveSet {
            by_comet: pairs
                .iter()
                .map(|(c, e)| (comet_key(c), e.to_string()))
                .collect(),
        }
    }

    fn commit(addr: &str) -> CommitSignature {
        CommitSignature {
            flag: BlockIdFlag::Commit,
            validator_address: addr.into(),
        }
    }

    fn row(addr: &str, from: u64, to: u64, votes: u64) -> ValidatorUptime {
        ValidatorUptime {
            evm_address: addr.into(),
            active_from: from,
            active_to: to,
            vote_count: votes,
        }
    }

    #[test]
    fn contiguous_heights_extend() {
        let active = set(&[("AA", "0x1111")]);
        let mut tracker = UptimeTracker::new();
        for h in 1..=5 {
            tracker.observe_active(h, &active);
            tracker.observe_commit(&[commit("aa")]);
        }
        assert_eq!(tracker.into_rows(), vec![row("0x1111", 1, 5, 5)]);
    }

    #[test]
    fn gap_resets_interval_and_votes() {
        let active = set(&[("AA", "0x1111")]);
        let mut tracker = UptimeTracker::new();
        tracker.observe_active(1, &active);
        tracker.observe_commit(&[commit("AA")]);
        tracker.observe_active(2, &active);
        tracker.observe_commit(&[commit("AA")]);
        // Not active at 3.
        tracker.observe_active(3, &ActiveSet::default());
        tracker.observe_active(4, &active);
        tracker.observe_commit(&[commit("AA")]);
        assert_eq!(tracker.into_rows(), vec![row("0x1111", 4, 4, 1)]);
    }

    #[test]
    fn nil_and_absent_do_not_count_as_votes() {
        let active = set(&[("AA", "0x1111")]);
        let mut tracker = UptimeTracker::new();
        tracker.observe_active(1, &active);
        tracker.observe_commit(&[
            CommitSignature {
                flag: BlockIdFlag::Nil,
                validator_address: "AA".into(),
            },
            CommitSignature {
                flag: BlockIdFlag::Absent,
                validator_address: String::new(),
            },
        ]);
        assert_eq!(tracker.into_rows()[0].vote_count, 0);
    }

    #[test]
    fn merge_follows_contiguity() {
        let stored_a = row("0x1111", 1, 10, 5);
        let stored_b = row("0x2222", 1, 10, 10);

        assert_eq!(
            merge_uptime(Some(&stored_a), &row("0x1111", 11, 20, 10)),
            row("0x1111", 1, 20, 15)
        );
        assert_eq!(
            merge_uptime(Some(&stored_b), &row("0x2222", 12, 20, 8)),
            row("0x2222", 12, 20, 8)
        );
        assert_eq!(
            merge_uptime(None, &row("0x3333", 11, 20, 10)),
            row("0x3333", 11, 20, 10)
        );
    }

    #[test]
    fn vote_rows_include_nil_and_reject_unknown() {
        let active = set(&[("AA", "0x1111"), ("BB", "0x2222")]);
        let sigs = vec![
            commit("AA"),
            CommitSignature {
                flag: BlockIdFlag::Nil,
                validator_address: "BB".into(),
            },
            CommitSignature {
                flag: BlockIdFlag::Absent,
                validator_address: String::new(),
            },
        ];
        let rows = vote_rows(7, &active, &sigs).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.block_height == 7));

        let err = vote_rows(7, &active, &[commit("CC")]).unwrap_err();
        assert!(matches!(err, IndexerError::UnknownValidator { height: 7, .. }));
    }

    #[test]
    fn window_floor_saturates() {
        assert_eq!(window_floor(100, 10), 91);
        assert_eq!(window_floor(5, 10), 0);
        assert_eq!(uptime_percent(50, 200), 25.0);
    }
}
