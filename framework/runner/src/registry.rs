use std::collections::HashMap;
use std::sync::Arc;

use cluster_aggregator_model::{AggregationDefinition, DefinitionSet, MAX_STEP_S};
use itertools::Itertools;

use crate::cycle::AggregationRunner;
use crate::task::AggregationTask;

/// What a call to [TaskRegistry::reconcile] changed. Keys are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Keys that were not tracked before.
    pub started: Vec<String>,
    /// Keys that are no longer in the latest set.
    pub stopped: Vec<String>,
    /// Keys whose definition body changed, so the old task was stopped and a new one started.
    pub replaced: Vec<String>,
    /// Keys whose task had exited on its own and was started again from the same definition.
    pub restarted: Vec<String>,
}

impl ReconcileOutcome {
    pub fn is_unchanged(&self) -> bool {
        self.started.is_empty()
            && self.stopped.is_empty()
            && self.replaced.is_empty()
            && self.restarted.is_empty()
    }
}

/// Owns exactly one live [AggregationTask] per active definition key.
///
/// Mutation goes through `&mut self`, so whoever owns the registry is its only writer.
pub struct TaskRegistry {
    runner: Arc<AggregationRunner>,
    tasks: HashMap<String, AggregationTask>,
}

impl TaskRegistry {
    pub fn new(runner: Arc<AggregationRunner>) -> Self {
        Self {
            runner,
            tasks: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tasks.contains_key(key)
    }

    /// The snapshot the task for `key` is running with.
    pub fn definition(&self, key: &str) -> Option<&AggregationDefinition> {
        self.tasks.get(key).map(AggregationTask::definition)
    }

    pub fn keys(&self) -> Vec<String> {
        self.tasks.keys().cloned().sorted().collect()
    }

    /// Bring the tracked tasks in line with `latest`.
    ///
    /// Tasks whose key has disappeared are cancelled, new keys get a new task, and keys whose
    /// definition body changed get their task replaced. A task that has exited without being
    /// cancelled is started again. Unchanged keys are left running untouched.
    pub fn reconcile(&mut self, latest: &DefinitionSet) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();

        let removed = self
            .tasks
            .keys()
            .filter(|key| !latest.contains_key(key.as_str()))
            .cloned()
            .sorted()
            .collect::<Vec<_>>();
        for key in removed {
            if let Some(task) = self.tasks.remove(&key) {
                log::info!("Dropping task for {}", task.definition());
                task.cancel();
            }
            outcome.stopped.push(key);
        }

        for (key, definition) in latest {
            if !definition.is_schedulable() {
                log::warn!(
                    "Cannot schedule a definition with a step outside 1..={}s: {}",
                    MAX_STEP_S,
                    definition
                );
                if let Some(task) = self.tasks.remove(key) {
                    task.cancel();
                    outcome.stopped.push(key.clone());
                }
                continue;
            }

            match self.tasks.get(key) {
                Some(task) if task.fingerprint() != definition.fingerprint() => {
                    if let Some(previous) = self.tasks.remove(key) {
                        log::info!("Replacing task for {} with {}", previous.definition(), definition);
                        previous.cancel();
                    }
                    self.start(key, definition);
                    outcome.replaced.push(key.clone());
                }
                Some(task) if task.is_finished() => {
                    log::warn!("Task for {} exited unexpectedly, restarting it", definition);
                    self.start(key, definition);
                    outcome.restarted.push(key.clone());
                }
                Some(_) => {}
                None => {
                    log::info!("Starting task for {}", definition);
                    self.start(key, definition);
                    outcome.started.push(key.clone());
                }
            }
        }

        outcome.stopped.sort();
        outcome
    }

    /// Cancel every task and wait for their loops to exit.
    pub async fn shutdown(&mut self) {
        let handles = self
            .tasks
            .drain()
            .map(|(_, task)| task.cancel())
            .collect::<Vec<_>>();

        log::info!("Waiting for {} task(s) to stop", handles.len());
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                log::warn!("Task did not stop cleanly: {e:?}");
            }
        }
    }

    fn start(&mut self, key: &str, definition: &AggregationDefinition) {
        let task = AggregationTask::spawn(definition.clone(), self.runner.clone());
        self.tasks.insert(key.to_string(), task);
    }
}
