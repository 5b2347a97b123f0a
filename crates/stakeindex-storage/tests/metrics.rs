//! Storage failures feed the global `stakeindex.storage_errors` counter.
//!
//! Kept in its own test binary: the global meter provider must be installed
//! before the first store error creates the instruments.

use opentelemetry::global;
use opentelemetry_sdk::metrics::data::Sum;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::testing::metrics::InMemoryMetricsExporter;

use stakeindex_core::checkpoint::CheckpointStore;
use stakeindex_core::error::IndexerError;
use stakeindex_storage::SqlStore;

fn storage_errors(provider: &SdkMeterProvider, exporter: &InMemoryMetricsExporter) -> u64 {
    provider.force_flush().unwrap();
    let exported = exporter.get_finished_metrics().unwrap();
    let Some(latest) = exported.last() else {
        return 0;
    };
    latest
        .scope_metrics
        .iter()
        .flat_map(|s| s.metrics.iter())
        .filter(|m| m.name == "stakeindex.storage_errors")
        .filter_map(|m| m.data.as_any().downcast_ref::<Sum<u64>>())
        .flat_map(|sum| sum.data_points.iter())
        .map(|p| p.value)
        .sum()
}

#[tokio::test(flavor = "multi_thread")]
async fn closed_pool_errors_are_counted() {
    let exporter = InMemoryMetricsExporter::default();
    let reader = PeriodicReader::builder(exporter.clone(), runtime::Tokio).build();
    let provider = SdkMeterProvider::builder().with_reader(reader).build();
    global::set_meter_provider(provider.clone());

    let store = SqlStore::in_memory().await.unwrap();
    store.setup("cl_block").await.unwrap();
    assert_eq!(storage_errors(&provider, &exporter), 0);

    store.close().await;
    let err = store.load("cl_block").await.unwrap_err();
    assert!(matches!(err, IndexerError::Storage(_)));
    assert!(store.advance("cl_block", 5).await.is_err());

    assert_eq!(storage_errors(&provider, &exporter), 2);
}
