//! Relational storage backend for StakeIndex.
//!
//! Persists checkpoints and every derived table through the `sqlx` `Any`
//! driver, so one implementation serves both SQLite and PostgreSQL.
//!
//! # Usage
//! ```rust,no_run
//! use stakeindex_storage::SqlStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // PostgreSQL (production)
//! let store = SqlStore::connect("postgres://indexer@localhost/stakeindex", 10).await?;
//!
//! // In-memory SQLite (tests / dry runs)
//! let store = SqlStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use num_bigint::BigUint;
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyConnection, AnyPool, Row};
use tracing::debug;

use stakeindex_core::checkpoint::{Checkpoint, CheckpointStore};
use stakeindex_core::error::IndexerError;
use stakeindex_core::metrics::StakeIndexMetrics;
use stakeindex_core::reward::merge_reward;
use stakeindex_core::store::IndexStore;
use stakeindex_core::types::{
    ClStakingEvent, ConsensusBlock, ElStakingEvent, ExecutionBlock, PersistedStakeChange, Reward,
    RewardDelta, StakingEventType, TotalStakeHist, TotalStakePoint, ValidatorUptime, ValidatorVote,
};

use crate::schema::SCHEMA;

/// Stands in for the block time of an event whose block row is missing.
/// The `Any` driver cannot decode a NULL produced by an outer join.
const NO_BLOCK_TIME: i64 = -1;

pub(crate) fn db_err(e: sqlx::Error) -> IndexerError {
    StakeIndexMetrics::global().record_storage_error(error_type(&e));
    IndexerError::Storage(e.to_string())
}

fn error_type(e: &sqlx::Error) -> &'static str {
    match e {
        sqlx::Error::Database(_) => "database",
        sqlx::Error::PoolTimedOut => "pool_timeout",
        sqlx::Error::PoolClosed => "pool_closed",
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) => "io",
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => "decode",
        _ => "other",
    }
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

pub(crate) fn parse_amount(raw: &str) -> Result<BigUint, IndexerError> {
    raw.parse::<BigUint>()
        .map_err(|e| IndexerError::Decode(format!("stored reward amount '{raw}': {e}")))
}

/// SQL-backed checkpoints, batch writers and read queries.
#[derive(Clone)]
pub struct SqlStore {
    pub(crate) pool: AnyPool,
}

impl SqlStore {
    /// Connect to `url` (`postgres://…` or `sqlite:…`) and create missing
    /// tables.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, IndexerError> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(url)
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.init_schema().await?;
        debug!(url, "storage ready");
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// A single connection that never expires keeps the database alive for
    /// the life of the pool.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Wait for in-flight queries and close every connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn init_schema(&self) -> Result<(), IndexerError> {
        for ddl in SCHEMA {
            sqlx::query(ddl).execute(&self.pool).await.map_err(db_err)?;
        }
        Ok(())
    }

    /// Move `indexer`'s checkpoint forward to `height` on `conn`.
    async fn advance_on(
        conn: &mut AnyConnection,
        indexer: &str,
        height: u64,
    ) -> Result<(), IndexerError> {
        let updated = sqlx::query(
            "UPDATE index_points SET block_height = $1, updated_at = $2
             WHERE indexer = $3 AND block_height < $4",
        )
        .bind(height as i64)
        .bind(now_unix())
        .bind(indexer)
        .bind(height as i64)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;

        if updated.rows_affected() == 0 {
            let exists = sqlx::query("SELECT block_height FROM index_points WHERE indexer = $1")
                .bind(indexer)
                .fetch_optional(&mut *conn)
                .await
                .map_err(db_err)?;
            if exists.is_none() {
                return Err(IndexerError::CheckpointMissing(indexer.to_string()));
            }
        }
        Ok(())
    }
}

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for SqlStore {
    async fn setup(&self, indexer: &str) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO index_points (indexer, block_height, updated_at)
             VALUES ($1, 0, $2)
             ON CONFLICT (indexer) DO NOTHING",
        )
        .bind(indexer)
        .bind(now_unix())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn load(&self, indexer: &str) -> Result<Option<u64>, IndexerError> {
        let row = sqlx::query("SELECT block_height FROM index_points WHERE indexer = $1")
            .bind(indexer)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(|r| r.get::<i64, _>("block_height") as u64))
    }

    async fn advance(&self, indexer: &str, height: u64) -> Result<(), IndexerError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        Self::advance_on(&mut conn, indexer, height).await
    }

    async fn list(&self) -> Result<Vec<Checkpoint>, IndexerError> {
        let rows = sqlx::query("SELECT indexer, block_height FROM index_points ORDER BY indexer")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows
            .into_iter()
            .map(|r| Checkpoint {
                indexer: r.get("indexer"),
                height: r.get::<i64, _>("block_height") as u64,
            })
            .collect())
    }
}

// ─── IndexStore impl ─────────────────────────────────────────────────────────

#[async_trait]
impl IndexStore for SqlStore {
    async fn commit_consensus_blocks(
        &self,
        indexer: &str,
        blocks: &[ConsensusBlock],
        checkpoint: u64,
    ) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for b in blocks {
            sqlx::query(
                "INSERT INTO cl_blocks (height, hash, proposer, time)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (height) DO UPDATE SET
                    hash = excluded.hash, proposer = excluded.proposer, time = excluded.time",
            )
            .bind(b.height as i64)
            .bind(&b.hash)
            .bind(&b.proposer)
            .bind(b.time)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        Self::advance_on(&mut tx, indexer, checkpoint).await?;
        tx.commit().await.map_err(db_err)?;

        debug!(indexer, rows = blocks.len(), checkpoint, "consensus blocks stored");
        Ok(())
    }

    async fn commit_execution_blocks(
        &self,
        indexer: &str,
        blocks: &[ExecutionBlock],
        checkpoint: u64,
    ) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for b in blocks {
            sqlx::query(
                "INSERT INTO el_blocks (height, hash, gas_used, gas_limit, time)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (height) DO UPDATE SET
                    hash = excluded.hash, gas_used = excluded.gas_used,
                    gas_limit = excluded.gas_limit, time = excluded.time",
            )
            .bind(b.height as i64)
            .bind(&b.hash)
            .bind(b.gas_used as i64)
            .bind(b.gas_limit as i64)
            .bind(b.time)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        Self::advance_on(&mut tx, indexer, checkpoint).await?;
        tx.commit().await.map_err(db_err)?;

        debug!(indexer, rows = blocks.len(), checkpoint, "execution blocks stored");
        Ok(())
    }

    async fn consensus_block_times(
        &self,
        heights: &[u64],
    ) -> Result<HashMap<u64, i64>, IndexerError> {
        let (Some(lo), Some(hi)) = (heights.iter().min(), heights.iter().max()) else {
            return Ok(HashMap::new());
        };
        let rows = sqlx::query("SELECT height, time FROM cl_blocks WHERE height >= $1 AND height <= $2")
            .bind(*lo as i64)
            .bind(*hi as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut times = HashMap::with_capacity(heights.len());
        for r in rows {
            let height = r.get::<i64, _>("height") as u64;
            if heights.contains(&height) {
                times.insert(height, r.get::<i64, _>("time"));
            }
        }
        Ok(times)
    }

    async fn commit_cl_staking_events(
        &self,
        indexer: &str,
        events: &[ClStakingEvent],
        checkpoint: u64,
    ) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for ev in events {
            sqlx::query(
                "INSERT INTO cl_staking_events
                    (block_height, event_index, el_tx_hash, event_type, status_ok, error_code, amount)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (block_height, event_index) DO UPDATE SET
                    el_tx_hash = excluded.el_tx_hash, event_type = excluded.event_type,
                    status_ok = excluded.status_ok, error_code = excluded.error_code,
                    amount = excluded.amount",
            )
            .bind(ev.block_height as i64)
            .bind(ev.event_index as i64)
            .bind(&ev.el_tx_hash)
            .bind(ev.event_type.as_str())
            .bind(ev.status_ok as i64)
            .bind(&ev.error_code)
            .bind(&ev.amount)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        Self::advance_on(&mut tx, indexer, checkpoint).await?;
        tx.commit().await.map_err(db_err)?;

        debug!(indexer, rows = events.len(), checkpoint, "consensus staking events stored");
        Ok(())
    }

    async fn commit_el_staking_events(
        &self,
        indexer: &str,
        events: &[ElStakingEvent],
        checkpoint: u64,
    ) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for ev in events {
            sqlx::query(
                "INSERT INTO el_staking_events
                    (tx_hash, log_index, block_height, event_type, address,
                     src_validator, dst_validator, dst_address)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 ON CONFLICT (tx_hash, log_index) DO UPDATE SET
                    block_height = excluded.block_height, event_type = excluded.event_type,
                    address = excluded.address, src_validator = excluded.src_validator,
                    dst_validator = excluded.dst_validator, dst_address = excluded.dst_address",
            )
            .bind(&ev.tx_hash)
            .bind(ev.log_index as i64)
            .bind(ev.block_height as i64)
            .bind(ev.event_type.as_str())
            .bind(&ev.address)
            .bind(&ev.src_validator)
            .bind(&ev.dst_validator)
            .bind(&ev.dst_address)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        Self::advance_on(&mut tx, indexer, checkpoint).await?;
        tx.commit().await.map_err(db_err)?;

        debug!(indexer, rows = events.len(), checkpoint, "execution staking events stored");
        Ok(())
    }

    async fn stake_changes_between(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<PersistedStakeChange>, IndexerError> {
        let rows = sqlx::query(
            "SELECT e.block_height, COALESCE(b.time, $5) AS time, e.event_type, e.amount
             FROM cl_staking_events e
             LEFT JOIN cl_blocks b ON b.height = e.block_height
             WHERE e.block_height >= $1 AND e.block_height <= $2
               AND e.status_ok = 1
               AND (e.event_type = $3 OR e.event_type = $4)
             ORDER BY e.block_height, e.event_index",
        )
        .bind(from as i64)
        .bind(to as i64)
        .bind(StakingEventType::Stake.as_str())
        .bind(StakingEventType::Unstake.as_str())
        .bind(NO_BLOCK_TIME)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|r| {
                let kind: String = r.get("event_type");
                let time: i64 = r.try_get("time").map_err(db_err)?;
                Ok(PersistedStakeChange {
                    block_height: r.get::<i64, _>("block_height") as u64,
                    block_time: (time != NO_BLOCK_TIME).then_some(time),
                    event_type: kind.parse()?,
                    amount: r.get("amount"),
                })
            })
            .collect()
    }

    async fn seed_total_stake(&self, genesis: &TotalStakePoint) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO cl_total_stakes (updated_at, amount) VALUES ($1, $2)
             ON CONFLICT (updated_at) DO NOTHING",
        )
        .bind(genesis.updated_at)
        .bind(genesis.amount)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn latest_total_stake(&self) -> Result<Option<TotalStakePoint>, IndexerError> {
        let row = sqlx::query(
            "SELECT updated_at, amount FROM cl_total_stakes ORDER BY updated_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(|r| TotalStakePoint {
            updated_at: r.get("updated_at"),
            amount: r.get("amount"),
        }))
    }

    async fn commit_total_stakes(
        &self,
        indexer: &str,
        points: &[TotalStakePoint],
        checkpoint: u64,
    ) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for p in points {
            sqlx::query(
                "INSERT INTO cl_total_stakes (updated_at, amount) VALUES ($1, $2)
                 ON CONFLICT (updated_at) DO UPDATE SET amount = excluded.amount",
            )
            .bind(p.updated_at)
            .bind(p.amount)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        Self::advance_on(&mut tx, indexer, checkpoint).await?;
        tx.commit().await.map_err(db_err)?;

        debug!(indexer, rows = points.len(), checkpoint, "total stake points stored");
        Ok(())
    }

    async fn seed_total_stake_hist(&self, genesis: &TotalStakeHist) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO cl_total_stake_hists (updated_at_block, updated_at_time, amount)
             VALUES ($1, $2, $3)
             ON CONFLICT DO NOTHING",
        )
        .bind(genesis.block as i64)
        .bind(genesis.time)
        .bind(genesis.amount)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn latest_total_stake_hist(&self) -> Result<Option<TotalStakeHist>, IndexerError> {
        let row = sqlx::query(
            "SELECT updated_at_block, updated_at_time, amount FROM cl_total_stake_hists
             ORDER BY updated_at_block DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(|r| TotalStakeHist {
            block: r.get::<i64, _>("updated_at_block") as u64,
            time: r.get("updated_at_time"),
            amount: r.get("amount"),
        }))
    }

    async fn commit_total_stake_hists(
        &self,
        indexer: &str,
        rows: &[TotalStakeHist],
        checkpoint: u64,
    ) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for h in rows {
            // A later block in the same second takes over the time slot.
            sqlx::query(
                "DELETE FROM cl_total_stake_hists
                 WHERE updated_at_time = $1 AND updated_at_block <> $2",
            )
            .bind(h.time)
            .bind(h.block as i64)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            sqlx::query(
                "INSERT INTO cl_total_stake_hists (updated_at_block, updated_at_time, amount)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (updated_at_block) DO UPDATE SET
                    updated_at_time = excluded.updated_at_time, amount = excluded.amount",
            )
            .bind(h.block as i64)
            .bind(h.time)
            .bind(h.amount)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        Self::advance_on(&mut tx, indexer, checkpoint).await?;
        tx.commit().await.map_err(db_err)?;

        debug!(indexer, rows = rows.len(), checkpoint, "total stake history stored");
        Ok(())
    }

    async fn commit_validator_uptimes(
        &self,
        indexer: &str,
        rows: &[ValidatorUptime],
        checkpoint: u64,
    ) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for u in rows {
            sqlx::query(
                "INSERT INTO cl_validator_uptimes (evm_address, active_from, active_to, vote_count)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (evm_address) DO UPDATE SET
                    active_from = CASE
                        WHEN cl_validator_uptimes.active_to + 1 = excluded.active_from
                        THEN cl_validator_uptimes.active_from
                        ELSE excluded.active_from END,
                    vote_count = CASE
                        WHEN cl_validator_uptimes.active_to + 1 = excluded.active_from
                        THEN cl_validator_uptimes.vote_count + excluded.vote_count
                        ELSE excluded.vote_count END,
                    active_to = excluded.active_to",
            )
            .bind(&u.evm_address)
            .bind(u.active_from as i64)
            .bind(u.active_to as i64)
            .bind(u.vote_count as i64)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        Self::advance_on(&mut tx, indexer, checkpoint).await?;
        tx.commit().await.map_err(db_err)?;

        debug!(indexer, rows = rows.len(), checkpoint, "validator uptimes stored");
        Ok(())
    }

    async fn commit_validator_votes(
        &self,
        indexer: &str,
        votes: &[ValidatorVote],
        keep_from: u64,
        checkpoint: u64,
    ) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for v in votes {
            sqlx::query(
                "INSERT INTO cl_validator_votes (validator, block_height) VALUES ($1, $2)
                 ON CONFLICT (validator, block_height) DO NOTHING",
            )
            .bind(&v.validator)
            .bind(v.block_height as i64)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        let pruned = sqlx::query("DELETE FROM cl_validator_votes WHERE block_height < $1")
            .bind(keep_from as i64)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        Self::advance_on(&mut tx, indexer, checkpoint).await?;
        tx.commit().await.map_err(db_err)?;

        debug!(
            indexer,
            rows = votes.len(),
            pruned = pruned.rows_affected(),
            keep_from,
            checkpoint,
            "validator votes stored"
        );
        Ok(())
    }

    async fn commit_rewards(
        &self,
        indexer: &str,
        deltas: &[RewardDelta],
        checkpoint: u64,
    ) -> Result<(), IndexerError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for d in deltas {
            let row = sqlx::query(
                "SELECT amount, last_update_height FROM el_rewards WHERE address = $1",
            )
            .bind(&d.address)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;

            let stored = match row {
                Some(r) => {
                    let amount: String = r.get("amount");
                    Some(Reward {
                        address: d.address.clone(),
                        amount: parse_amount(&amount)?,
                        last_update_height: r.get::<i64, _>("last_update_height") as u64,
                    })
                }
                None => None,
            };
            let merged = merge_reward(stored.as_ref(), d);

            sqlx::query(
                "INSERT INTO el_rewards (address, amount, last_update_height) VALUES ($1, $2, $3)
                 ON CONFLICT (address) DO UPDATE SET
                    amount = excluded.amount, last_update_height = excluded.last_update_height",
            )
            .bind(&merged.address)
            .bind(merged.amount.to_string())
            .bind(merged.last_update_height as i64)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        Self::advance_on(&mut tx, indexer, checkpoint).await?;
        tx.commit().await.map_err(db_err)?;

        debug!(indexer, rows = deltas.len(), checkpoint, "rewards stored");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn checkpoint_setup_and_advance() {
        let store = SqlStore::in_memory().await.unwrap();
        assert_eq!(store.load("cl_block").await.unwrap(), None);

        store.setup("cl_block").await.unwrap();
        assert_eq!(store.load("cl_block").await.unwrap(), Some(0));

        store.advance("cl_block", 120).await.unwrap();
        store.setup("cl_block").await.unwrap();
        assert_eq!(store.load("cl_block").await.unwrap(), Some(120));
    }

    #[tokio::test]
    async fn checkpoint_never_moves_backwards() {
        let store = SqlStore::in_memory().await.unwrap();
        store.setup("el_block").await.unwrap();
        store.advance("el_block", 300).await.unwrap();
        store.advance("el_block", 200).await.unwrap();
        store.advance("el_block", 300).await.unwrap();
        assert_eq!(store.load("el_block").await.unwrap(), Some(300));
    }

    #[tokio::test]
    async fn advance_without_setup_fails() {
        let store = SqlStore::in_memory().await.unwrap();
        assert!(matches!(
            store.advance("ghost", 1).await,
            Err(IndexerError::CheckpointMissing(_))
        ));
    }

    #[tokio::test]
    async fn list_is_sorted() {
        let store = SqlStore::in_memory().await.unwrap();
        store.setup("el_reward").await.unwrap();
        store.setup("cl_block").await.unwrap();
        store.advance("cl_block", 7).await.unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].indexer, "cl_block");
        assert_eq!(all[0].height, 7);
        assert_eq!(all[1].indexer, "el_reward");
        assert_eq!(all[1].height, 0);
    }

    #[tokio::test]
    async fn commit_rolls_back_when_checkpoint_missing() {
        let store = SqlStore::in_memory().await.unwrap();
        let block = ConsensusBlock {
            height: 1,
            hash: "0xaa".into(),
            proposer: "AB".into(),
            time: 10,
        };
        assert!(store
            .commit_consensus_blocks("cl_block", &[block], 1)
            .await
            .is_err());
        assert_eq!(store.consensus_block_times(&[1]).await.unwrap().len(), 0);
    }
}
