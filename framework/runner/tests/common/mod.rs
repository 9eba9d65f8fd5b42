#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cluster_aggregator_model::{
    AggregationDefinition, DefinitionSet, FreshnessWindow, HostCounter, MetricValue, MetricValues,
    Sample, SeriesType,
};
use cluster_aggregator_runner::prelude::{
    AggregationRunner, DefinitionStore, HostGroupResolver, MetricFetcher, PublishSink,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;

pub fn definition(id: u64, numerator: &str, denominator: &str, step: u64) -> AggregationDefinition {
    AggregationDefinition {
        id,
        group_id: 1,
        numerator: numerator.to_string(),
        denominator: denominator.to_string(),
        endpoint: "cluster".to_string(),
        metric: format!("cluster.metric.{id}"),
        tags: "role=web".to_string(),
        series_type: SeriesType::Gauge,
        step,
        last_update: None,
    }
}

pub fn definition_set(definitions: &[AggregationDefinition]) -> DefinitionSet {
    definitions
        .iter()
        .map(|d| (d.key(), d.clone()))
        .collect()
}

#[derive(Default)]
pub struct MemoryStore {
    definitions: Mutex<Option<DefinitionSet>>,
}

impl MemoryStore {
    pub fn set(&self, definitions: DefinitionSet) {
        *self.definitions.lock() = Some(definitions);
    }

    /// Make reads fail until the next [MemoryStore::set].
    pub fn fail(&self) {
        *self.definitions.lock() = None;
    }
}

impl DefinitionStore for MemoryStore {
    fn read_all_active_definitions(&self) -> BoxFuture<'_, anyhow::Result<DefinitionSet>> {
        let definitions = self.definitions.lock().clone();
        async move { definitions.ok_or_else(|| anyhow::anyhow!("Store unavailable")) }.boxed()
    }
}

#[derive(Default)]
pub struct FixedHostGroups {
    groups: HashMap<u64, Vec<String>>,
}

impl FixedHostGroups {
    pub fn with_group(mut self, group_id: u64, hosts: &[&str]) -> Self {
        self.groups
            .insert(group_id, hosts.iter().map(|h| h.to_string()).collect());
        self
    }
}

impl HostGroupResolver for FixedHostGroups {
    fn hosts_for_group(&self, group_id: u64) -> BoxFuture<'_, anyhow::Result<Vec<String>>> {
        let hosts = self.groups.get(&group_id).cloned();
        async move { hosts.ok_or_else(|| anyhow::anyhow!("Unknown group {group_id}")) }.boxed()
    }
}

/// Where the fake fetcher takes its values from.
pub enum Answer {
    /// Every requested pair gets this value.
    Uniform(f64),
    /// Only these pairs have values.
    Fixed(HashMap<(String, String), f64>),
    /// Every batch fails.
    Fail,
    /// Every batch panics, taking the calling task down with it.
    Panic,
}

pub struct MemoryFetcher {
    answer: Answer,
    /// Seconds subtracted from the end of the window when stamping values.
    age_s: i64,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requested: Mutex<Vec<Vec<HostCounter>>>,
}

impl MemoryFetcher {
    pub fn new(answer: Answer) -> Self {
        Self {
            answer,
            age_s: 0,
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn uniform(value: f64) -> Self {
        Self::new(Answer::Uniform(value))
    }

    pub fn fixed(values: &[(&str, &str, f64)]) -> Self {
        Self::new(Answer::Fixed(
            values
                .iter()
                .map(|(host, counter, value)| ((host.to_string(), counter.to_string()), *value))
                .collect(),
        ))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_age(mut self, age_s: i64) -> Self {
        self.age_s = age_s;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<Vec<HostCounter>> {
        self.requested.lock().clone()
    }
}

impl MetricFetcher for MemoryFetcher {
    fn fetch_last_values<'a>(
        &'a self,
        pairs: &'a [HostCounter],
        window: FreshnessWindow,
    ) -> BoxFuture<'a, anyhow::Result<MetricValues>> {
        async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().push(pairs.to_vec());
            let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let timestamp = window.end - self.age_s;
            let mut values = MetricValues::new();
            match &self.answer {
                Answer::Fail => anyhow::bail!("Connection refused"),
                Answer::Panic => panic!("Fetcher crashed"),
                Answer::Uniform(value) => {
                    for pair in pairs {
                        values.insert(
                            pair.host.as_str(),
                            pair.counter.as_str(),
                            MetricValue::new(*value, timestamp),
                        );
                    }
                }
                Answer::Fixed(fixed) => {
                    for pair in pairs {
                        if let Some(value) = fixed.get(&(pair.host.clone(), pair.counter.clone())) {
                            values.insert(
                                pair.host.as_str(),
                                pair.counter.as_str(),
                                MetricValue::new(*value, timestamp),
                            );
                        }
                    }
                }
            }

            Ok(values)
        }
        .boxed()
    }
}

#[derive(Default)]
pub struct RecordingSink {
    samples: Mutex<Vec<Sample>>,
}

impl RecordingSink {
    pub fn samples(&self) -> Vec<Sample> {
        self.samples.lock().clone()
    }

    pub fn count_for(&self, metric: &str) -> usize {
        self.samples
            .lock()
            .iter()
            .filter(|s| s.metric == metric)
            .count()
    }
}

impl PublishSink for RecordingSink {
    fn push(&self, sample: Sample) {
        self.samples.lock().push(sample);
    }
}

pub struct Harness {
    pub fetcher: Arc<MemoryFetcher>,
    pub sink: Arc<RecordingSink>,
    pub runner: Arc<AggregationRunner>,
}

impl Harness {
    pub fn new(groups: FixedHostGroups, fetcher: MemoryFetcher) -> Self {
        env_logger::try_init().ok();

        let fetcher = Arc::new(fetcher);
        let sink = Arc::new(RecordingSink::default());
        let runner = Arc::new(AggregationRunner::new(
            Arc::new(groups),
            fetcher.clone(),
            sink.clone(),
        ));

        Self {
            fetcher,
            sink,
            runner,
        }
    }
}
