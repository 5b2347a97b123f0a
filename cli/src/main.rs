//! stakeindex CLI — run the staking indexers and inspect their checkpoints.
//!
//! Usage:
//! ```bash
//! stakeindex run    --config stakeindex.toml
//! stakeindex status --config stakeindex.toml
//! stakeindex info
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use stakeindex_core::checkpoint::CheckpointStore;
use stakeindex_core::indexer::{DEFAULT_BATCH_SIZE, DEFAULT_LAG, DEFAULT_POLL_INTERVAL_MS};
use stakeindex_core::reward::DEFAULT_REWARD_FLUSH_SIZE;
use stakeindex_core::supervisor::IndexerSet;
use stakeindex_core::telemetry::init_tracing;
use stakeindex_core::uptime::DEFAULT_VOTE_WINDOW;
use stakeindex_storage::SqlStore;

mod config;
mod wiring;

use config::{Config, ALL_INDEXERS, ENV_DATABASE_URL, ENV_REDIS_URL};
use wiring::{build_cache, build_indexers, init_metrics, Sources};

#[derive(Parser)]
#[command(
    name = "stakeindex",
    about = "Incremental staking indexer for a CometBFT + EVM chain",
    long_about = "
Follows the consensus chain (CometBFT RPC) and the execution chain (EVM
JSON-RPC) and keeps derived staking tables in SQLite or PostgreSQL.

ENVIRONMENT VARIABLES:
  STAKEINDEX_DATABASE_URL   overrides database.url
  STAKEINDEX_REDIS_URL      overrides cache.redis_url
  RUST_LOG                  overrides the [log] section
",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every enabled indexer and run until Ctrl-C / SIGTERM
    Run {
        /// Path to the TOML configuration file
        #[arg(short, long, default_value = "stakeindex.toml")]
        config: PathBuf,
    },

    /// Print every checkpoint stored in the database
    Status {
        /// Path to the TOML configuration file
        #[arg(short, long, default_value = "stakeindex.toml")]
        config: PathBuf,
    },

    /// Show defaults and the known indexers
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config } => cmd_run(&config).await,
        Commands::Status { config } => cmd_status(&config).await,
        Commands::Info => {
            cmd_info();
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("loading config from {}", path.display()))
}

async fn cmd_run(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    init_tracing(&config.log);
    let meter_provider = init_metrics(&config.metrics).context("starting metrics exporter")?;

    let store = Arc::new(
        SqlStore::connect(&config.database.url, config.database.max_connections)
            .await
            .context("connecting to database")?,
    );
    let cache = build_cache(&config).await.context("connecting to cache")?;
    let sources = Sources::connect(&config).context("building RPC clients")?;

    let mut set = IndexerSet::new(store.clone(), config.indexer.scheduling());
    for indexer in build_indexers(&config, &sources, store.clone(), cache)? {
        set.push(indexer);
    }
    set.init().await.context("initializing indexers")?;
    tracing::info!(indexers = ?set.names(), "Starting indexers");

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            tracing::info!("Shutdown requested, waiting for in-flight ticks");
            cancel.cancel();
        }
    });

    set.run(cancel).await;
    store.close().await;
    tracing::info!("Database closed");
    if let Some(provider) = meter_provider {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = %e, "Metrics exporter did not shut down cleanly");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn cmd_status(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let store = SqlStore::connect(&config.database.url, 1)
        .await
        .context("connecting to database")?;

    let checkpoints = store.list().await?;
    if checkpoints.is_empty() {
        println!("No checkpoints yet. Run `stakeindex run` first.");
    } else {
        println!("{:<24} {:>12}", "INDEXER", "HEIGHT");
        for cp in &checkpoints {
            println!("{:<24} {:>12}", cp.indexer, cp.height);
        }
    }
    store.close().await;
    Ok(())
}

fn cmd_info() {
    println!("StakeIndex v{}", env!("CARGO_PKG_VERSION"));
    println!("  Poll interval: {DEFAULT_POLL_INTERVAL_MS} ms");
    println!("  Lag before a tick does work: {DEFAULT_LAG} blocks");
    println!("  Batch size: {DEFAULT_BATCH_SIZE} blocks per commit");
    println!("  Reward flush: every {DEFAULT_REWARD_FLUSH_SIZE} addresses");
    println!("  Vote window: {DEFAULT_VOTE_WINDOW} blocks");
    println!("  Storage backends: SQLite, PostgreSQL");
    println!(
        "  Cache: in-process{}",
        if cfg!(feature = "redis") { ", Redis" } else { "" }
    );
    println!("  Metrics: stakeindex.batches_committed, index_errors, storage_errors, rpc_errors (OTLP when [metrics] is set)");
    println!("  Secrets from env: {ENV_DATABASE_URL}, {ENV_REDIS_URL}");
    println!("  Indexers:");
    for name in ALL_INDEXERS {
        println!("    {name}");
    }
}
