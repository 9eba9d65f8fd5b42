//! The services an aggregation cycle depends on but does not own.

use cluster_aggregator_model::{DefinitionSet, FreshnessWindow, HostCounter, MetricValues, Sample};
use futures::future::BoxFuture;

/// Source of the active aggregation definitions.
pub trait DefinitionStore: Send + Sync {
    fn read_all_active_definitions(&self) -> BoxFuture<'_, anyhow::Result<DefinitionSet>>;
}

/// Resolves a host group to its member hosts.
pub trait HostGroupResolver: Send + Sync {
    /// Hosts are returned in a stable order.
    fn hosts_for_group(&self, group_id: u64) -> BoxFuture<'_, anyhow::Result<Vec<String>>>;
}

/// Fetches the latest value of many (host, counter) pairs in a single request.
pub trait MetricFetcher: Send + Sync {
    /// Pairs that are unknown or have no sample in the window are left out of the result. Only a
    /// transport level failure should fail the whole batch.
    fn fetch_last_values<'a>(
        &'a self,
        pairs: &'a [HostCounter],
        window: FreshnessWindow,
    ) -> BoxFuture<'a, anyhow::Result<MetricValues>>;
}

/// Receives computed aggregates.
///
/// Fire and forget: implementations must not block the caller and nothing waits for an
/// acknowledgement.
pub trait PublishSink: Send + Sync {
    fn push(&self, sample: Sample);
}
