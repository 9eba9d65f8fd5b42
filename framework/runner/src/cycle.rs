use std::sync::Arc;

use cluster_aggregator_expression::{
    clean, needs_computation, validate, Expression, ExpressionError,
};
use cluster_aggregator_model::{AggregationDefinition, HostCounter, MetricValues, Sample};
use itertools::Itertools;
use thiserror::Error;

use crate::collaborator::{HostGroupResolver, MetricFetcher, PublishSink};

/// Which side of the ratio an expression belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Side {
    #[display("numerator")]
    Numerator,
    #[display("denominator")]
    Denominator,
}

/// Reasons a cycle stops without publishing.
///
/// None of these are fatal to the task, the next tick starts again from scratch.
#[derive(Error, Debug)]
pub enum CycleAbort {
    #[error("Invalid {side} expression: {source}")]
    InvalidDefinition {
        side: Side,
        #[source]
        source: ExpressionError,
    },
    #[error("Numerator and denominator are both constant, nothing to compute")]
    NothingToCompute,
    #[error("Failed to resolve host group {group_id}: {error:#}")]
    HostGroupUnavailable { group_id: u64, error: anyhow::Error },
    #[error("Host group {0} has no hosts")]
    EmptyHostGroup(u64),
    #[error("Failed to fetch counter values: {0:#}")]
    FetchFailed(anyhow::Error),
    #[error("Denominator resolved to zero")]
    ZeroDenominator,
}

impl CycleAbort {
    /// The level an abort is reported at. Group resolution problems and constant ratios are
    /// expected in normal operation and stay quiet.
    pub fn log_level(&self) -> log::Level {
        match self {
            CycleAbort::InvalidDefinition { .. }
            | CycleAbort::FetchFailed(_)
            | CycleAbort::ZeroDenominator => log::Level::Warn,
            CycleAbort::NothingToCompute
            | CycleAbort::HostGroupUnavailable { .. }
            | CycleAbort::EmptyHostGroup(_) => log::Level::Debug,
        }
    }
}

/// What a successful cycle computed and published.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub numerator: f64,
    pub denominator: f64,
    pub value: f64,
    /// Hosts where every computed side was valid.
    pub valid_hosts: usize,
    pub total_hosts: usize,
}

/// Runs one evaluation cycle for one definition: resolve the group, fetch every referenced
/// counter in one batch, sum the valid hosts, divide and publish.
pub struct AggregationRunner {
    hosts: Arc<dyn HostGroupResolver>,
    fetcher: Arc<dyn MetricFetcher>,
    sink: Arc<dyn PublishSink>,
}

impl AggregationRunner {
    pub fn new(
        hosts: Arc<dyn HostGroupResolver>,
        fetcher: Arc<dyn MetricFetcher>,
        sink: Arc<dyn PublishSink>,
    ) -> Self {
        Self {
            hosts,
            fetcher,
            sink,
        }
    }

    /// Run a cycle and log the outcome. Nothing here can fail the caller.
    pub async fn tick(&self, definition: &AggregationDefinition) {
        match self.run_cycle(definition).await {
            Ok(report) => {
                log::trace!(
                    "Published {} = {} ({} / {}) from {} of {} hosts",
                    definition.metric,
                    report.value,
                    report.numerator,
                    report.denominator,
                    report.valid_hosts,
                    report.total_hosts,
                );
            }
            Err(abort) => {
                log::log!(abort.log_level(), "{abort}: {definition}");
            }
        }
    }

    pub async fn run_cycle(
        &self,
        definition: &AggregationDefinition,
    ) -> Result<CycleReport, CycleAbort> {
        let (numerator, denominator) = prepare_expressions(definition)?;

        let hosts = self
            .hosts
            .hosts_for_group(definition.group_id)
            .await
            .map_err(|error| CycleAbort::HostGroupUnavailable {
                group_id: definition.group_id,
                error,
            })?;
        if hosts.is_empty() {
            return Err(CycleAbort::EmptyHostGroup(definition.group_id));
        }

        let now = chrono::Utc::now().timestamp();
        let window = definition.freshness_window(now);
        let pairs = batch_pairs(&hosts, &numerator, &denominator);

        let mut values = self
            .fetcher
            .fetch_last_values(&pairs, window)
            .await
            .map_err(CycleAbort::FetchFailed)?;
        values.retain_within(window);

        let mut numerator_total = 0.0;
        let mut denominator_total = 0.0;
        let mut valid_hosts = 0;
        for host in &hosts {
            let numerator_value = host_value(Side::Numerator, &numerator, host, &values, definition);
            let denominator_value =
                host_value(Side::Denominator, &denominator, host, &values, definition);

            if let (Some(n), Some(d)) = (numerator_value, denominator_value) {
                numerator_total += n;
                denominator_total += d;
                valid_hosts += 1;
            }
        }

        let numerator_total = resolve(&numerator, numerator_total, valid_hosts);
        let denominator_total = resolve(&denominator, denominator_total, valid_hosts);

        if denominator_total == 0.0 {
            return Err(CycleAbort::ZeroDenominator);
        }

        let value = numerator_total / denominator_total;
        self.sink.push(Sample {
            endpoint: definition.endpoint.clone(),
            metric: definition.metric.clone(),
            tags: definition.tags.clone(),
            value,
            series_type: definition.series_type,
            step: definition.step,
            timestamp: now,
        });

        Ok(CycleReport {
            numerator: numerator_total,
            denominator: denominator_total,
            value,
            valid_hosts,
            total_hosts: hosts.len(),
        })
    }
}

/// Clean, validate and parse both sides of the definition.
///
/// Both sides are checked for disallowed characters before anything else, and a definition where
/// neither side references a counter is rejected before either side is parsed.
pub fn prepare_expressions(
    definition: &AggregationDefinition,
) -> Result<(Expression, Expression), CycleAbort> {
    let numerator = clean(&definition.numerator);
    let denominator = clean(&definition.denominator);

    validate(&numerator).map_err(|source| invalid(Side::Numerator, source))?;
    validate(&denominator).map_err(|source| invalid(Side::Denominator, source))?;

    if !needs_computation(&numerator) && !needs_computation(&denominator) {
        return Err(CycleAbort::NothingToCompute);
    }

    let numerator =
        Expression::parse_cleaned(&numerator).map_err(|source| invalid(Side::Numerator, source))?;
    let denominator = Expression::parse_cleaned(&denominator)
        .map_err(|source| invalid(Side::Denominator, source))?;

    Ok((numerator, denominator))
}

fn invalid(side: Side, source: ExpressionError) -> CycleAbort {
    CycleAbort::InvalidDefinition { side, source }
}

/// Every host crossed with the union of counters referenced by either side.
fn batch_pairs(hosts: &[String], numerator: &Expression, denominator: &Expression) -> Vec<HostCounter> {
    let counters = numerator
        .counters()
        .iter()
        .chain(denominator.counters())
        .unique()
        .collect::<Vec<_>>();

    counters
        .iter()
        .cartesian_product(hosts)
        .map(|(counter, host)| HostCounter::new(host.as_str(), counter.as_str()))
        .collect()
}

/// The contribution of one side for one host. Sides that are not computed per host always
/// contribute nothing and never invalidate the host.
fn host_value(
    side: Side,
    expression: &Expression,
    host: &str,
    values: &MetricValues,
    definition: &AggregationDefinition,
) -> Option<f64> {
    let Expression::Counters(sum) = expression else {
        return Some(0.0);
    };

    let value = sum.compute(host, values);
    if value.is_none() {
        log::debug!(
            "[host:{}] [{}:{}] invalid or not found for {}",
            host,
            side,
            sum,
            definition.metric
        );
    }
    value
}

fn resolve(expression: &Expression, summed: f64, valid_hosts: usize) -> f64 {
    match expression {
        Expression::Literal(value) => *value,
        Expression::HostCount => valid_hosts as f64,
        Expression::Counters(_) => summed,
    }
}
