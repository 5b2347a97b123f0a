//! StakeIndex metrics definitions.
//!
//! All metrics use OpenTelemetry conventions. Until a `MeterProvider` is
//! installed globally they are no-ops.
//!
//! - `stakeindex.batches_committed`: counter, tagged with indexer
//! - `stakeindex.index_errors`: counter, tagged with indexer and error kind
//! - `stakeindex.storage_errors`: counter, tagged with error kind
//! - `stakeindex.rpc_errors`: counter, tagged with method and error kind

use std::sync::OnceLock;

use opentelemetry::{
    global,
    metrics::{Counter, Meter},
    KeyValue,
};

use crate::error::IndexerError;

/// Central metrics handle for StakeIndex.
#[derive(Clone)]
pub struct StakeIndexMetrics {
    pub batches_committed: Counter<u64>,
    pub index_errors: Counter<u64>,
    pub storage_errors: Counter<u64>,
    pub rpc_errors: Counter<u64>,
}

static GLOBAL: OnceLock<StakeIndexMetrics> = OnceLock::new();

impl StakeIndexMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            batches_committed: meter
                .u64_counter("stakeindex.batches_committed")
                .with_description("Sub-ranges committed together with their checkpoint")
                .init(),
            index_errors: meter
                .u64_counter("stakeindex.index_errors")
                .with_description("Sub-ranges aborted by an error")
                .init(),
            storage_errors: meter
                .u64_counter("stakeindex.storage_errors")
                .with_description("Failed database operations")
                .init(),
            rpc_errors: meter
                .u64_counter("stakeindex.rpc_errors")
                .with_description("JSON-RPC requests that failed after retries")
                .init(),
        }
    }

    /// Handle on the global meter provider, created on first use.
    ///
    /// Install the provider before the first call or every instrument stays
    /// a no-op.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(|| Self::new(&global::meter("stakeindex")))
    }

    pub fn record_batch(&self, indexer: &str) {
        self.batches_committed
            .add(1, &[KeyValue::new("indexer", indexer.to_string())]);
    }

    pub fn record_index_error(&self, indexer: &str, error: &IndexerError) {
        self.index_errors.add(
            1,
            &[
                KeyValue::new("indexer", indexer.to_string()),
                KeyValue::new("error_type", error.kind()),
            ],
        );
    }

    pub fn record_storage_error(&self, error_type: &'static str) {
        self.storage_errors
            .add(1, &[KeyValue::new("error_type", error_type)]);
    }

    pub fn record_rpc_error(&self, method: &str, error_type: &'static str) {
        self.rpc_errors.add(
            1,
            &[
                KeyValue::new("method", method.to_string()),
                KeyValue::new("error_type", error_type),
            ],
        );
    }
}
