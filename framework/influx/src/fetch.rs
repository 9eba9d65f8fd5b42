use std::collections::{BTreeMap, HashMap};

use anyhow::Context;
use cluster_aggregator_model::tags::{parse_tags, split_counter};
use cluster_aggregator_model::{FreshnessWindow, HostCounter, MetricValue, MetricValues};
use cluster_aggregator_runner::prelude::MetricFetcher;
use futures::future::BoxFuture;
use futures::FutureExt;
use influxdb::{Client, ReadQuery};
use serde::Deserialize;
use serde_json::Value;

use crate::escape::{quote_identifier, quote_literal};

#[derive(Debug, Clone, Deserialize)]
struct StatementResult {
    statement_id: Option<usize>,
    #[serde(default)]
    series: Vec<QuerySeries>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct QuerySeries {
    name: String,
    #[serde(default)]
    tags: HashMap<String, String>,
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Reads the last value of each counter per host with one multi-statement query per batch.
///
/// A counter name is `metric` or `metric/key=value,...`, the tag part becomes extra filters on the
/// statement. Hosts are matched on `host_tag`.
pub struct InfluxMetricFetcher {
    client: Client,
    host_tag: String,
}

impl InfluxMetricFetcher {
    pub fn new(client: Client, host_tag: impl Into<String>) -> Self {
        Self {
            client,
            host_tag: host_tag.into(),
        }
    }
}

impl MetricFetcher for InfluxMetricFetcher {
    fn fetch_last_values<'a>(
        &'a self,
        pairs: &'a [HostCounter],
        window: FreshnessWindow,
    ) -> BoxFuture<'a, anyhow::Result<MetricValues>> {
        async move {
            let statements = last_value_statements(pairs, window, &self.host_tag);
            let Some(((_, first), rest)) = statements.split_first() else {
                return Ok(MetricValues::new());
            };

            let query = rest
                .iter()
                .fold(ReadQuery::new(first.as_str()), |query, (_, statement)| {
                    query.add_query(statement.as_str())
                });
            log::debug!("Querying: {:?}", query);

            let response = self
                .client
                .json_query(query)
                .await
                .context("Failed to query last counter values")?;

            let counters = statements
                .into_iter()
                .map(|(counter, _)| counter)
                .collect::<Vec<_>>();
            let values = parse_last_values(&response.results, &counters, &self.host_tag);
            log::trace!("Loaded {} of {} values", values.len(), pairs.len());

            Ok(values)
        }
        .boxed()
    }
}

/// One statement per distinct counter, in counter order, each paired with the counter it reads.
pub(crate) fn last_value_statements(
    pairs: &[HostCounter],
    window: FreshnessWindow,
    host_tag: &str,
) -> Vec<(String, String)> {
    let mut hosts_by_counter = BTreeMap::<&str, Vec<&str>>::new();
    for pair in pairs {
        let hosts = hosts_by_counter.entry(pair.counter.as_str()).or_default();
        if !hosts.contains(&pair.host.as_str()) {
            hosts.push(pair.host.as_str());
        }
    }

    hosts_by_counter
        .into_iter()
        .map(|(counter, hosts)| {
            let statement = last_value_statement(counter, &hosts, window, host_tag);
            (counter.to_string(), statement)
        })
        .collect()
}

fn last_value_statement(
    counter: &str,
    hosts: &[&str],
    window: FreshnessWindow,
    host_tag: &str,
) -> String {
    let (metric, tags) = split_counter(counter);
    let host_tag = quote_identifier(host_tag);

    let host_filter = hosts
        .iter()
        .map(|host| format!("{} = {}", host_tag, quote_literal(host)))
        .collect::<Vec<_>>()
        .join(" OR ");

    let mut statement = format!(
        r#"SELECT LAST("value") FROM {} WHERE ({})"#,
        quote_identifier(metric),
        host_filter
    );
    for (key, value) in parse_tags(tags) {
        statement.push_str(&format!(
            " AND {} = {}",
            quote_identifier(&key),
            quote_literal(&value)
        ));
    }
    statement.push_str(&format!(
        " AND time >= {}s AND time <= {}s GROUP BY {}",
        window.begin, window.end, host_tag
    ));

    statement
}

/// Map per-statement results back to `(host, counter)` values.
///
/// Statements that failed, series without a host tag and rows without a numeric value are left
/// out rather than failing the batch.
pub(crate) fn parse_last_values(
    results: &[Value],
    counters: &[String],
    host_tag: &str,
) -> MetricValues {
    let mut values = MetricValues::new();

    for (position, raw) in results.iter().enumerate() {
        let result = match StatementResult::deserialize(raw) {
            Ok(result) => result,
            Err(e) => {
                log::debug!("Ignoring unreadable statement result: {e}");
                continue;
            }
        };

        let index = result.statement_id.unwrap_or(position);
        let Some(counter) = counters.get(index) else {
            log::debug!("Ignoring result for unknown statement {index}");
            continue;
        };
        if let Some(error) = result.error {
            log::debug!("Statement for {counter} failed: {error}");
            continue;
        }

        for series in result.series {
            let Some(host) = series.tags.get(host_tag) else {
                log::debug!("Series {} has no {host_tag} tag", series.name);
                continue;
            };
            let Some(value) = last_row(&series) else {
                log::debug!("No usable value for {counter} on {host}");
                continue;
            };
            values.insert(host.as_str(), counter.as_str(), value);
        }
    }

    values
}

fn last_row(series: &QuerySeries) -> Option<MetricValue> {
    let time_index = series.columns.iter().position(|c| c == "time")?;
    let value_index = series
        .columns
        .iter()
        .position(|c| c == "last" || c == "value")?;

    series.values.iter().rev().find_map(|row| {
        let value = row.get(value_index)?.as_f64()?;
        let timestamp = parse_time(row.get(time_index)?)?;
        Some(MetricValue::new(value, timestamp))
    })
}

/// Times come back as RFC3339 strings unless an epoch precision was requested.
fn parse_time(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.timestamp()),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}
