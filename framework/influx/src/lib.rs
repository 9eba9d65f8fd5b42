//! InfluxDB backed [MetricFetcher](cluster_aggregator_runner::prelude::MetricFetcher) and
//! [PublishSink](cluster_aggregator_runner::prelude::PublishSink).

mod escape;
mod fetch;
mod sink;

pub use fetch::InfluxMetricFetcher;
pub use sink::InfluxPublishSink;
