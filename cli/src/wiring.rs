//! Builds the enabled indexers from a [`Config`].

use std::sync::Arc;

use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::runtime;

use stakeindex_core::cache::{Cache, MemoryCache};
use stakeindex_core::error::IndexerError;
use stakeindex_core::indexer::Indexer;
use stakeindex_core::source::{ConsensusSource, ExecutionSource};
use stakeindex_core::store::IndexStore;
use stakeindex_cosmos::{
    ClBlockIndexer, ClStakingEventIndexer, ClTotalStakeHistIndexer, ClTotalStakeIndexer,
    ClValidatorUptimeIndexer, ClValidatorVoteIndexer, CometClient, CL_BLOCK, CL_STAKING_EVENT,
    CL_TOTAL_STAKE, CL_TOTAL_STAKE_HIST, CL_VALIDATOR_UPTIME, CL_VALIDATOR_VOTE,
};
use stakeindex_evm::{
    ElBlockIndexer, ElRewardIndexer, ElStakingEventIndexer, EvmClient, EL_BLOCK, EL_REWARD,
    EL_STAKING_EVENT,
};

use crate::config::{Config, MetricsConfig};

/// Install the OTLP meter provider globally when an endpoint is configured.
///
/// Must run before anything records a metric; instruments created earlier
/// stay no-ops.
pub fn init_metrics(config: &MetricsConfig) -> Result<Option<SdkMeterProvider>, IndexerError> {
    let Some(endpoint) = config.otlp_endpoint.as_deref() else {
        return Ok(None);
    };
    let provider = opentelemetry_otlp::new_pipeline()
        .metrics(runtime::Tokio)
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_period(config.export_interval())
        .build()
        .map_err(|e| IndexerError::Config(format!("metrics exporter for {endpoint}: {e}")))?;
    global::set_meter_provider(provider.clone());
    tracing::info!(endpoint, "Exporting metrics over OTLP");
    Ok(Some(provider))
}

/// Redis when configured (and compiled in), the in-process cache otherwise.
pub async fn build_cache(config: &Config) -> Result<Arc<dyn Cache>, IndexerError> {
    match config.cache.redis_url.as_deref() {
        #[cfg(feature = "redis")]
        Some(url) => {
            let cache = stakeindex_storage::RedisCache::connect(url).await?;
            tracing::info!("Using Redis cache");
            Ok(Arc::new(cache))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            tracing::warn!("cache.redis_url is set but this build has no Redis support, using in-process cache");
            Ok(Arc::new(MemoryCache::new()))
        }
        None => Ok(Arc::new(MemoryCache::new())),
    }
}

pub struct Sources {
    pub consensus: Arc<dyn ConsensusSource>,
    pub execution: Arc<dyn ExecutionSource>,
}

impl Sources {
    pub fn connect(config: &Config) -> Result<Self, IndexerError> {
        let chain = &config.chain;
        let consensus = CometClient::new(&chain.cometbft_rpc, chain.timeout(), chain.retry_policy())?;
        let execution = EvmClient::new(
            &chain.evm_rpc,
            chain.timeout(),
            chain.retry_policy(),
            &chain.staking_contract,
        )?;
        Ok(Self {
            consensus: Arc::new(consensus),
            execution: Arc::new(execution),
        })
    }
}

/// One indexer per enabled name, in start-up order.
pub fn build_indexers(
    config: &Config,
    sources: &Sources,
    store: Arc<dyn IndexStore>,
    cache: Arc<dyn Cache>,
) -> Result<Vec<Arc<dyn Indexer>>, IndexerError> {
    let genesis = config.genesis.stake_genesis()?;
    let cl = &sources.consensus;
    let el = &sources.execution;

    config
        .indexer
        .enabled_indexers()
        .into_iter()
        .map(|name| {
            let indexer: Arc<dyn Indexer> = match name {
                CL_BLOCK => Arc::new(ClBlockIndexer::new(cl.clone(), store.clone())),
                CL_STAKING_EVENT => Arc::new(ClStakingEventIndexer::new(cl.clone(), store.clone())),
                CL_TOTAL_STAKE => Arc::new(ClTotalStakeIndexer::new(cl.clone(), store.clone(), genesis)),
                CL_TOTAL_STAKE_HIST => Arc::new(ClTotalStakeHistIndexer::new(store.clone(), genesis)),
                CL_VALIDATOR_UPTIME => Arc::new(ClValidatorUptimeIndexer::new(
                    cl.clone(),
                    store.clone(),
                    cache.clone(),
                )),
                CL_VALIDATOR_VOTE => Arc::new(ClValidatorVoteIndexer::new(
                    cl.clone(),
                    store.clone(),
                    cache.clone(),
                    config.indexer.vote_window,
                )),
                EL_BLOCK => Arc::new(ElBlockIndexer::new(el.clone(), store.clone())),
                EL_STAKING_EVENT => Arc::new(ElStakingEventIndexer::new(el.clone(), store.clone())),
                EL_REWARD => Arc::new(ElRewardIndexer::new(
                    el.clone(),
                    store.clone(),
                    cache.clone(),
                    config.indexer.reward_flush_size,
                )),
                other => return Err(IndexerError::Config(format!("unknown indexer '{other}'"))),
            };
            Ok(indexer)
        })
        .collect()
}
