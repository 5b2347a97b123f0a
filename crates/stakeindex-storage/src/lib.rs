//! stakeindex-storage — relational and cache backends for StakeIndex.
//!
//! Backends:
//! - [`sql`]: SQLite / PostgreSQL via the `sqlx` `Any` driver: checkpoints,
//!   batch writers and read queries
//! - `redis_cache`: Redis cache (feature `redis`)
//!
//! The in-memory cache lives in `stakeindex-core`.

mod schema;

pub mod queries;
pub mod sql;

#[cfg(feature = "redis")]
pub mod redis_cache;

pub use queries::{Operation, OperationsPage, StakeInterval};
pub use sql::SqlStore;

#[cfg(feature = "redis")]
pub use redis_cache::RedisCache;
