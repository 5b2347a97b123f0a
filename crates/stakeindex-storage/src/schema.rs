//! Table definitions.
//!
//! Only `BIGINT` and `TEXT` columns are used so the same DDL and queries run
//! on SQLite and PostgreSQL through the `Any` driver. Times are unix seconds;
//! reward amounts are decimal text.

pub(crate) const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS index_points (
        indexer      TEXT   PRIMARY KEY,
        block_height BIGINT NOT NULL,
        updated_at   BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS cl_blocks (
        height   BIGINT PRIMARY KEY,
        hash     TEXT   NOT NULL,
        proposer TEXT   NOT NULL,
        time     BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS el_blocks (
        height    BIGINT PRIMARY KEY,
        hash      TEXT   NOT NULL,
        gas_used  BIGINT NOT NULL,
        gas_limit BIGINT NOT NULL,
        time      BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS cl_staking_events (
        block_height BIGINT NOT NULL,
        event_index  BIGINT NOT NULL,
        el_tx_hash   TEXT   NOT NULL,
        event_type   TEXT   NOT NULL,
        status_ok    BIGINT NOT NULL,
        error_code   TEXT   NOT NULL,
        amount       TEXT   NOT NULL,
        PRIMARY KEY (block_height, event_index)
    )",
    "CREATE INDEX IF NOT EXISTS idx_cl_staking_events_tx ON cl_staking_events (el_tx_hash)",
    "CREATE TABLE IF NOT EXISTS el_staking_events (
        tx_hash       TEXT   NOT NULL,
        log_index     BIGINT NOT NULL,
        block_height  BIGINT NOT NULL,
        event_type    TEXT   NOT NULL,
        address       TEXT   NOT NULL,
        src_validator TEXT   NOT NULL,
        dst_validator TEXT   NOT NULL,
        dst_address   TEXT   NOT NULL,
        PRIMARY KEY (tx_hash, log_index)
    )",
    "CREATE INDEX IF NOT EXISTS idx_el_staking_events_address ON el_staking_events (address)",
    "CREATE TABLE IF NOT EXISTS cl_total_stakes (
        updated_at BIGINT PRIMARY KEY,
        amount     BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS cl_total_stake_hists (
        updated_at_block BIGINT PRIMARY KEY,
        updated_at_time  BIGINT NOT NULL UNIQUE,
        amount           BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS cl_validator_uptimes (
        evm_address TEXT   PRIMARY KEY,
        active_from BIGINT NOT NULL,
        active_to   BIGINT NOT NULL,
        vote_count  BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS cl_validator_votes (
        validator    TEXT   NOT NULL,
        block_height BIGINT NOT NULL,
        PRIMARY KEY (validator, block_height)
    )",
    "CREATE INDEX IF NOT EXISTS idx_cl_validator_votes_height ON cl_validator_votes (block_height)",
    "CREATE TABLE IF NOT EXISTS el_rewards (
        address            TEXT   PRIMARY KEY,
        amount             TEXT   NOT NULL,
        last_update_height BIGINT NOT NULL
    )",
];
