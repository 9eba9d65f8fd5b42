use std::sync::Arc;
use std::time::Duration;

use cluster_aggregator_core::prelude::DelegatedShutdownListener;

use crate::collaborator::DefinitionStore;
use crate::registry::{ReconcileOutcome, TaskRegistry};

/// Periodically reads the definition store and reconciles the task registry against it.
///
/// The reconciler owns the registry, which makes it the only writer.
pub struct Reconciler {
    store: Arc<dyn DefinitionStore>,
    registry: TaskRegistry,
    interval: Duration,
}

impl Reconciler {
    pub fn new(store: Arc<dyn DefinitionStore>, registry: TaskRegistry, interval: Duration) -> Self {
        Self {
            store,
            registry,
            interval,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Read the latest definitions and reconcile the registry against them.
    ///
    /// If the store cannot be read then nothing changes and [None] is returned, the running tasks
    /// carry on with the definitions they already have.
    pub async fn reconcile_once(&mut self) -> Option<ReconcileOutcome> {
        let latest = match self.store.read_all_active_definitions().await {
            Ok(latest) => latest,
            Err(e) => {
                log::warn!("Failed to read aggregation definitions: {e:#}");
                return None;
            }
        };

        let outcome = self.registry.reconcile(&latest);
        if outcome.is_unchanged() {
            log::debug!("{} aggregation task(s), nothing changed", self.registry.len());
        } else {
            log::info!(
                "{} aggregation task(s): started {:?}, stopped {:?}, replaced {:?}, restarted {:?}",
                self.registry.len(),
                outcome.started,
                outcome.stopped,
                outcome.replaced,
                outcome.restarted
            );
        }

        Some(outcome)
    }

    /// Reconcile immediately and then once per interval until shutdown, then stop every task.
    pub async fn run(mut self, mut shutdown_listener: DelegatedShutdownListener) {
        loop {
            self.reconcile_once().await;

            tokio::select! {
                _ = shutdown_listener.wait_for_shutdown() => {
                    log::debug!("Shutting down reconciliation");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.registry.shutdown().await;
    }
}
