use std::sync::Arc;

use cluster_aggregator_core::prelude::{DelegatedShutdownListener, ShutdownHandle};
use cluster_aggregator_model::AggregationDefinition;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::cycle::AggregationRunner;

/// A running periodic evaluation of one definition snapshot.
///
/// The first cycle runs one full period after the task is spawned. Cycles run inline in the
/// task's own loop so a slow cycle can never overlap itself; ticks that fall due while a cycle is
/// still running are skipped rather than queued.
#[derive(Debug)]
pub struct AggregationTask {
    definition: Arc<AggregationDefinition>,
    fingerprint: String,
    stop: ShutdownHandle,
    join_handle: JoinHandle<()>,
}

impl AggregationTask {
    /// Must be called from within a Tokio runtime.
    pub fn spawn(definition: AggregationDefinition, runner: Arc<AggregationRunner>) -> Self {
        let fingerprint = definition.fingerprint();
        let definition = Arc::new(definition);
        let stop = ShutdownHandle::new();

        let join_handle = tokio::spawn(run_periodic(
            definition.clone(),
            runner,
            stop.new_listener(),
        ));

        Self {
            definition,
            fingerprint,
            stop,
            join_handle,
        }
    }

    pub fn definition(&self) -> &AggregationDefinition {
        &self.definition
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Signal the task to stop. No new cycle starts after this, a cycle that is already running
    /// is allowed to complete.
    ///
    /// Consumes the task so the signal can only be sent once. The returned handle resolves when
    /// the task loop has exited.
    pub fn cancel(self) -> JoinHandle<()> {
        self.stop.shutdown();
        self.join_handle
    }
}

async fn run_periodic(
    definition: Arc<AggregationDefinition>,
    runner: Arc<AggregationRunner>,
    mut stop: DelegatedShutdownListener,
) {
    let period = definition.period();
    let Some(start) = Instant::now().checked_add(period) else {
        log::warn!("Period {:?} is too long to schedule {}", period, definition);
        return;
    };
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    log::debug!("Started task {} every {:?}", definition.key(), period);

    loop {
        tokio::select! {
            biased;

            _ = stop.wait_for_shutdown() => {
                log::debug!("Stopping task {}", definition.key());
                break;
            }
            _ = ticker.tick() => {
                runner.tick(&definition).await;
            }
        }
    }
}
