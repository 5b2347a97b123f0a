//! Read-side queries over the derived tables.
//!
//! Pure reads; nothing here touches checkpoints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::Row;

use stakeindex_core::error::IndexerError;
use stakeindex_core::types::{ConsensusBlock, ExecutionBlock, Reward, TotalStakePoint, ValidatorUptime};

use crate::sql::{db_err, parse_amount, SqlStore};

/// Largest page served by [`SqlStore::operations`].
pub const MAX_PER_PAGE: u32 = 100;

/// One staking operation: an execution-side log joined with the consensus
/// event that carried it out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub tx_hash: String,
    pub block_height: u64,
    pub event_type: String,
    pub address: String,
    pub src_validator: String,
    pub dst_validator: String,
    pub dst_address: String,
    pub status_ok: bool,
    pub error_code: String,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationsPage {
    pub total: u64,
    pub items: Vec<Operation>,
}

/// Time filter of the total-stake series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakeInterval {
    OneDay,
    SevenDays,
    ThirtyDays,
    All,
}

impl StakeInterval {
    /// Window length in seconds; `None` for the full series.
    pub fn seconds(&self) -> Option<i64> {
        const DAY: i64 = 24 * 60 * 60;
        match self {
            Self::OneDay => Some(DAY),
            Self::SevenDays => Some(7 * DAY),
            Self::ThirtyDays => Some(30 * DAY),
            Self::All => None,
        }
    }
}

impl std::str::FromStr for StakeInterval {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1d" => Ok(Self::OneDay),
            "7d" => Ok(Self::SevenDays),
            "30d" => Ok(Self::ThirtyDays),
            "all" => Ok(Self::All),
            other => Err(IndexerError::Decode(format!("unknown interval '{other}'"))),
        }
    }
}

fn point(r: &sqlx::any::AnyRow) -> TotalStakePoint {
    TotalStakePoint {
        updated_at: r.get("updated_at"),
        amount: r.get("amount"),
    }
}

fn uptime(r: &sqlx::any::AnyRow) -> ValidatorUptime {
    ValidatorUptime {
        evm_address: r.get("evm_address"),
        active_from: r.get::<i64, _>("active_from") as u64,
        active_to: r.get::<i64, _>("active_to") as u64,
        vote_count: r.get::<i64, _>("vote_count") as u64,
    }
}

impl SqlStore {
    // ─── Blocks ──────────────────────────────────────────────────────────────

    pub async fn latest_consensus_block(&self) -> Result<Option<ConsensusBlock>, IndexerError> {
        let row = sqlx::query(
            "SELECT height, hash, proposer, time FROM cl_blocks ORDER BY height DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(|r| ConsensusBlock {
            height: r.get::<i64, _>("height") as u64,
            hash: r.get("hash"),
            proposer: r.get("proposer"),
            time: r.get("time"),
        }))
    }

    /// The `n` highest execution blocks, newest first.
    pub async fn latest_execution_blocks(&self, n: u32) -> Result<Vec<ExecutionBlock>, IndexerError> {
        let rows = sqlx::query(
            "SELECT height, hash, gas_used, gas_limit, time FROM el_blocks
             ORDER BY height DESC LIMIT $1",
        )
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows
            .into_iter()
            .map(|r| ExecutionBlock {
                height: r.get::<i64, _>("height") as u64,
                hash: r.get("hash"),
                gas_used: r.get::<i64, _>("gas_used") as u64,
                gas_limit: r.get::<i64, _>("gas_limit") as u64,
                time: r.get("time"),
                withdrawals: Vec::new(),
            })
            .collect())
    }

    // ─── Operations ──────────────────────────────────────────────────────────

    /// Operations initiated by `address`, newest first. `page` starts at 1;
    /// `per_page` is clamped to `1..=100`.
    pub async fn operations(
        &self,
        address: &str,
        page: u32,
        per_page: u32,
    ) -> Result<OperationsPage, IndexerError> {
        let address = address.to_lowercase();
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PER_PAGE);
        let offset = (page as i64 - 1) * per_page as i64;

        let total = sqlx::query(
            "SELECT COUNT(*) AS cnt
             FROM el_staking_events el
             INNER JOIN cl_staking_events cl ON el.tx_hash = cl.el_tx_hash
             WHERE el.address = $1",
        )
        .bind(&address)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?
        .get::<i64, _>("cnt");

        let rows = sqlx::query(
            "SELECT el.tx_hash, el.block_height, el.event_type, el.address,
                    el.src_validator, el.dst_validator, el.dst_address,
                    cl.status_ok, cl.error_code, cl.amount
             FROM el_staking_events el
             INNER JOIN cl_staking_events cl ON el.tx_hash = cl.el_tx_hash
             WHERE el.address = $1
             ORDER BY el.block_height DESC, el.log_index DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(&address)
        .bind(per_page as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let items = rows
            .into_iter()
            .map(|r| Operation {
                tx_hash: r.get("tx_hash"),
                block_height: r.get::<i64, _>("block_height") as u64,
                event_type: r.get("event_type"),
                address: r.get("address"),
                src_validator: r.get("src_validator"),
                dst_validator: r.get("dst_validator"),
                dst_address: r.get("dst_address"),
                status_ok: r.get::<i64, _>("status_ok") != 0,
                error_code: r.get("error_code"),
                amount: r.get("amount"),
            })
            .collect();

        Ok(OperationsPage {
            total: total as u64,
            items,
        })
    }

    // ─── Rewards ─────────────────────────────────────────────────────────────

    pub async fn reward(&self, address: &str) -> Result<Option<Reward>, IndexerError> {
        let row = sqlx::query(
            "SELECT address, amount, last_update_height FROM el_rewards WHERE address = $1",
        )
        .bind(address.to_lowercase())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|r| {
            let amount: String = r.get("amount");
            Ok(Reward {
                address: r.get("address"),
                amount: parse_amount(&amount)?,
                last_update_height: r.get::<i64, _>("last_update_height") as u64,
            })
        })
        .transpose()
    }

    // ─── Validators ──────────────────────────────────────────────────────────

    /// Votes per validator inside the retained window. An empty `validators`
    /// slice returns every validator with at least one vote.
    pub async fn validator_vote_counts(
        &self,
        validators: &[String],
    ) -> Result<BTreeMap<String, u64>, IndexerError> {
        let rows = sqlx::query(
            "SELECT validator, COUNT(*) AS votes FROM cl_validator_votes GROUP BY validator",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let wanted: Vec<String> = validators.iter().map(|v| v.to_lowercase()).collect();
        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    r.get::<String, _>("validator"),
                    r.get::<i64, _>("votes") as u64,
                )
            })
            .filter(|(v, _)| wanted.is_empty() || wanted.contains(v))
            .collect())
    }

    pub async fn validator_uptime(
        &self,
        evm_address: &str,
    ) -> Result<Option<ValidatorUptime>, IndexerError> {
        let row = sqlx::query(
            "SELECT evm_address, active_from, active_to, vote_count
             FROM cl_validator_uptimes WHERE evm_address = $1",
        )
        .bind(evm_address.to_lowercase())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.as_ref().map(uptime))
    }

    pub async fn validator_uptimes(&self) -> Result<Vec<ValidatorUptime>, IndexerError> {
        let rows = sqlx::query(
            "SELECT evm_address, active_from, active_to, vote_count
             FROM cl_validator_uptimes ORDER BY evm_address",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(uptime).collect())
    }

    // ─── Total stake ─────────────────────────────────────────────────────────

    pub async fn all_total_stakes(&self) -> Result<Vec<TotalStakePoint>, IndexerError> {
        let rows = sqlx::query("SELECT updated_at, amount FROM cl_total_stakes ORDER BY updated_at")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.iter().map(point).collect())
    }

    /// Points strictly after `after` (unix seconds), oldest first.
    pub async fn total_stakes_after(&self, after: i64) -> Result<Vec<TotalStakePoint>, IndexerError> {
        let rows = sqlx::query(
            "SELECT updated_at, amount FROM cl_total_stakes WHERE updated_at > $1
             ORDER BY updated_at",
        )
        .bind(after)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(point).collect())
    }

    /// Last point at or before `at` (unix seconds).
    pub async fn total_stake_at(&self, at: i64) -> Result<Option<TotalStakePoint>, IndexerError> {
        let row = sqlx::query(
            "SELECT updated_at, amount FROM cl_total_stakes WHERE updated_at <= $1
             ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.as_ref().map(point))
    }

    /// Series for `interval` ending at `now`. A windowed series starts with
    /// the value in force at the window start so the chart has no leading
    /// gap.
    pub async fn total_stake_series(
        &self,
        interval: StakeInterval,
        now: i64,
    ) -> Result<Vec<TotalStakePoint>, IndexerError> {
        let Some(window) = interval.seconds() else {
            return self.all_total_stakes().await;
        };
        let cutoff = now - window;
        let mut series: Vec<_> = self.total_stake_at(cutoff).await?.into_iter().collect();
        series.extend(self.total_stakes_after(cutoff).await?);
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_names() {
        assert_eq!("1d".parse::<StakeInterval>().unwrap(), StakeInterval::OneDay);
        assert_eq!("all".parse::<StakeInterval>().unwrap(), StakeInterval::All);
        assert!("2w".parse::<StakeInterval>().is_err());
        assert_eq!(StakeInterval::SevenDays.seconds(), Some(604_800));
        assert_eq!(StakeInterval::All.seconds(), None);
    }
}
