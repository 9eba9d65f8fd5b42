use std::collections::HashMap;

use crate::definition::SeriesType;

/// One (host, counter) pair to look up in a batch fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostCounter {
    pub host: String,
    pub counter: String,
}

impl HostCounter {
    pub fn new(host: impl Into<String>, counter: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            counter: counter.into(),
        }
    }
}

/// The latest sample of a counter on a host. Timestamps are Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricValue {
    pub value: f64,
    pub timestamp: i64,
}

impl MetricValue {
    pub fn new(value: f64, timestamp: i64) -> Self {
        Self { value, timestamp }
    }
}

/// Inclusive range of Unix timestamps, in seconds, within which a sample is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessWindow {
    pub begin: i64,
    pub end: i64,
}

impl FreshnessWindow {
    pub fn new(begin: i64, end: i64) -> Self {
        Self { begin, end }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.begin <= timestamp && timestamp <= self.end
    }
}

/// Fetched values, host first then counter, so lookups can be made with borrowed keys.
///
/// Pairs that were not fetched, or have been dropped as stale, are simply absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricValues {
    by_host: HashMap<String, HashMap<String, MetricValue>>,
}

impl MetricValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, host: impl Into<String>, counter: impl Into<String>, value: MetricValue) {
        self.by_host
            .entry(host.into())
            .or_default()
            .insert(counter.into(), value);
    }

    pub fn get(&self, host: &str, counter: &str) -> Option<&MetricValue> {
        self.by_host.get(host).and_then(|counters| counters.get(counter))
    }

    /// Drop every value sampled outside of the window.
    pub fn retain_within(&mut self, window: FreshnessWindow) {
        self.by_host.retain(|_, counters| {
            counters.retain(|_, value| window.contains(value.timestamp));
            !counters.is_empty()
        });
    }

    pub fn len(&self) -> usize {
        self.by_host.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A computed aggregate, ready to be pushed downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub endpoint: String,
    pub metric: String,
    pub tags: String,
    pub value: f64,
    pub series_type: SeriesType,
    pub step: u64,
    /// Unix seconds at which the aggregate was computed.
    pub timestamp: i64,
}
