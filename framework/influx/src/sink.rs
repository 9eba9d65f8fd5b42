use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cluster_aggregator_core::prelude::DelegatedShutdownListener;
use cluster_aggregator_model::tags::parse_tags;
use cluster_aggregator_model::Sample;
use cluster_aggregator_runner::prelude::PublishSink;
use influxdb::{Client, InfluxDbWriteable, Timestamp, WriteQuery};
use tokio::select;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Publishes aggregates to InfluxDB from a background write task.
///
/// [PublishSink::push] only queues the write. When the shutdown listener fires, the write task
/// drains whatever is still queued and then exits.
pub struct InfluxPublishSink {
    writer: UnboundedSender<WriteQuery>,
    host_tag: String,
    flush_complete: Arc<AtomicBool>,
}

impl InfluxPublishSink {
    /// Must be called from within a Tokio runtime. The returned handle resolves once the queue
    /// has been drained after shutdown.
    pub fn start(
        client: Client,
        host_tag: impl Into<String>,
        shutdown_listener: DelegatedShutdownListener,
    ) -> (Self, JoinHandle<()>) {
        let flush_complete = Arc::new(AtomicBool::new(false));
        let (writer, queue) = tokio::sync::mpsc::unbounded_channel();
        let join_handle = tokio::spawn(run_writer(
            client,
            queue,
            shutdown_listener,
            flush_complete.clone(),
        ));

        (
            Self {
                writer,
                host_tag: host_tag.into(),
                flush_complete,
            },
            join_handle,
        )
    }

    pub fn is_flushed(&self) -> bool {
        self.flush_complete.load(Ordering::Acquire)
    }
}

impl PublishSink for InfluxPublishSink {
    fn push(&self, sample: Sample) {
        let query = sample_to_query(&sample, &self.host_tag);

        if self.writer.send(query).is_err() {
            log::info!(
                "Dropping aggregate {} for {}, the publisher has stopped",
                sample.metric,
                sample.endpoint
            );
        }
    }
}

/// The sample's metric is the measurement, its endpoint goes in `host_tag`.
pub(crate) fn sample_to_query(sample: &Sample, host_tag: &str) -> WriteQuery {
    let mut query = Timestamp::Seconds(sample.timestamp.max(0) as u128)
        .into_query(sample.metric.as_str())
        .add_field("value", sample.value)
        .add_field("step", sample.step)
        .add_tag(host_tag, sample.endpoint.as_str())
        .add_tag("ds_type", sample.series_type.as_str());

    for (k, v) in parse_tags(&sample.tags) {
        query = query.add_tag(k, v);
    }

    query
}

async fn run_writer(
    client: Client,
    mut queue: UnboundedReceiver<WriteQuery>,
    mut shutdown_listener: DelegatedShutdownListener,
    flush_complete: Arc<AtomicBool>,
) {
    loop {
        let next = select! {
            _ = shutdown_listener.wait_for_shutdown() => None,
            query = queue.recv() => query,
        };
        let Some(query) = next else {
            break;
        };
        write(&client, query).await;
    }

    // No new pushes are accepted once closed, whatever was queued before is still delivered.
    queue.close();
    let mut remaining = 0;
    while let Some(query) = queue.recv().await {
        write(&client, query).await;
        remaining += 1;
    }

    log::debug!("Publisher stopped, {remaining} queued aggregate(s) written during shutdown");
    flush_complete.store(true, Ordering::Release);
}

async fn write(client: &Client, query: WriteQuery) {
    if let Err(e) = client.query(query).await {
        log::warn!("Failed to write aggregate to InfluxDB: {}", e);
    }
}
