use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::time::Duration;

use crate::metric::FreshnessWindow;

/// The longest step a definition can be scheduled with, one year.
pub const MAX_STEP_S: u64 = 366 * 24 * 60 * 60;

/// The latest set of active definitions, keyed by [AggregationDefinition::key].
pub type DefinitionSet = BTreeMap<String, AggregationDefinition>;

/// How the downstream store should interpret the published series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SeriesType {
    #[default]
    Gauge,
    Counter,
    Derive,
}

impl SeriesType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesType::Gauge => "GAUGE",
            SeriesType::Counter => "COUNTER",
            SeriesType::Derive => "DERIVE",
        }
    }
}

impl Display for SeriesType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rule producing one derived metric from per-host counters across a host group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregationDefinition {
    /// Identity of the definition, stable across reconciliation cycles.
    pub id: u64,
    /// The host group whose members are aggregated.
    pub group_id: u64,
    /// Numerator expression, e.g. `$(cpu.busy)+$(cpu.idle)`, `$#` or a literal.
    pub numerator: String,
    /// Denominator expression, same grammar as [AggregationDefinition::numerator].
    pub denominator: String,
    /// Endpoint identity the published series is attributed to.
    pub endpoint: String,
    /// Metric name of the published series.
    pub metric: String,
    /// Tags of the published series in `key=value,key=value` form.
    #[serde(default)]
    pub tags: String,
    #[serde(default, rename = "ds_type")]
    pub series_type: SeriesType,
    /// Polling period in seconds.
    pub step: u64,
    /// When the definition was last edited, as reported by the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<i64>,
}

impl AggregationDefinition {
    pub fn key(&self) -> String {
        self.id.to_string()
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.step)
    }

    /// A task can only be scheduled for a step between one second and [MAX_STEP_S].
    pub fn is_schedulable(&self) -> bool {
        (1..=MAX_STEP_S).contains(&self.step)
    }

    /// Samples older than two periods are considered stale.
    pub fn freshness_window(&self, now: i64) -> FreshnessWindow {
        let span = i64::try_from(self.step.saturating_mul(2)).unwrap_or(i64::MAX);
        FreshnessWindow::new(now.saturating_sub(span), now)
    }

    /// Compute a fingerprint of the definition body.
    ///
    /// Two snapshots with the same key but different fingerprints describe an edited definition.
    /// Every field takes part, so a change to any of them is noticed. The fingerprint is computed
    /// using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.id.to_le_bytes());
        Digest::update(&mut hasher, self.group_id.to_le_bytes());
        // Length prefixes keep adjacent strings from bleeding into each other.
        for part in [
            &self.numerator,
            &self.denominator,
            &self.endpoint,
            &self.metric,
            &self.tags,
        ] {
            Digest::update(&mut hasher, (part.len() as u64).to_le_bytes());
            Digest::update(&mut hasher, part.as_bytes());
        }
        Digest::update(&mut hasher, self.series_type.as_str().as_bytes());
        Digest::update(&mut hasher, self.step.to_le_bytes());
        if let Some(last_update) = self.last_update {
            Digest::update(&mut hasher, last_update.to_le_bytes());
        }

        format!("{:x}", hasher.finalize())
    }
}

impl Display for AggregationDefinition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<Id:{}, GroupId:{}, Numerator:{}, Denominator:{}, Endpoint:{}, Metric:{}, Tags:{}, DsType:{}, Step:{}>",
            self.id,
            self.group_id,
            self.numerator,
            self.denominator,
            self.endpoint,
            self.metric,
            self.tags,
            self.series_type,
            self.step,
        )
    }
}

#[derive(Debug, Default, Deserialize)]
struct DefinitionsFile {
    #[serde(default, rename = "cluster")]
    clusters: Vec<AggregationDefinition>,
}

/// Parse a TOML definitions document made of `[[cluster]]` tables.
///
/// Definitions that can never be scheduled, see [AggregationDefinition::is_schedulable], are
/// skipped. If two definitions share an id then the later one wins.
pub fn parse_definitions(content: &str) -> anyhow::Result<DefinitionSet> {
    let file: DefinitionsFile = toml::from_str(content)?;

    let mut definitions = DefinitionSet::new();
    for definition in file.clusters {
        if !definition.is_schedulable() {
            log::warn!(
                "Skipping definition with a step outside 1..={}s: {}",
                MAX_STEP_S,
                definition
            );
            continue;
        }

        if let Some(previous) = definitions.insert(definition.key(), definition) {
            log::warn!("Duplicate definition id, replacing {}", previous);
        }
    }

    Ok(definitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_definition() -> AggregationDefinition {
        AggregationDefinition {
            id: 7,
            group_id: 3,
            numerator: "$(cpu.busy)".to_string(),
            denominator: "$#".to_string(),
            endpoint: "cluster-web".to_string(),
            metric: "cluster.cpu.busy".to_string(),
            tags: "role=web".to_string(),
            series_type: SeriesType::Gauge,
            step: 60,
            last_update: None,
        }
    }

    #[test]
    fn fingerprint_is_stable() {
        let definition = sample_definition();
        assert_eq!(definition.fingerprint(), definition.clone().fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_body() {
        let definition = sample_definition();

        let mut edited = definition.clone();
        edited.numerator = "$(cpu.idle)".to_string();
        assert_ne!(definition.fingerprint(), edited.fingerprint());

        let mut edited = definition.clone();
        edited.step = 30;
        assert_ne!(definition.fingerprint(), edited.fingerprint());
    }

    #[test]
    fn fingerprint_separates_adjacent_fields() {
        let mut first = sample_definition();
        first.endpoint = "ab".to_string();
        first.metric = "c".to_string();

        let mut second = sample_definition();
        second.endpoint = "a".to_string();
        second.metric = "bc".to_string();

        assert_ne!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn freshness_window_spans_two_periods() {
        let window = sample_definition().freshness_window(1_000);
        assert_eq!(window, FreshnessWindow::new(880, 1_000));
    }

    #[test]
    fn parse_definitions_file() -> anyhow::Result<()> {
        let definitions = parse_definitions(
            r#"
            [[cluster]]
            id = 1
            group_id = 10
            numerator = "$(cpu.busy)"
            denominator = "$#"
            endpoint = "cluster-web"
            metric = "cluster.cpu.busy"
            tags = "role=web"
            ds_type = "GAUGE"
            step = 60

            [[cluster]]
            id = 2
            group_id = 11
            numerator = "$(net.if.in.bytes/iface=eth0)"
            denominator = "1"
            endpoint = "cluster-db"
            metric = "cluster.net.in"
            ds_type = "COUNTER"
            step = 30
            "#,
        )?;

        assert_eq!(definitions.len(), 2);
        assert_eq!(definitions["1"].group_id, 10);
        assert_eq!(definitions["2"].series_type, SeriesType::Counter);
        assert_eq!(definitions["2"].tags, "");
        Ok(())
    }

    #[test]
    fn zero_step_definitions_are_skipped() -> anyhow::Result<()> {
        let definitions = parse_definitions(
            r#"
            [[cluster]]
            id = 1
            group_id = 10
            numerator = "$(cpu.busy)"
            denominator = "$#"
            endpoint = "cluster-web"
            metric = "cluster.cpu.busy"
            step = 0
            "#,
        )?;

        assert!(definitions.is_empty());
        Ok(())
    }

    #[test]
    fn later_duplicate_wins() -> anyhow::Result<()> {
        let definitions = parse_definitions(
            r#"
            [[cluster]]
            id = 1
            group_id = 10
            numerator = "$(cpu.busy)"
            denominator = "$#"
            endpoint = "cluster-web"
            metric = "first"
            step = 60

            [[cluster]]
            id = 1
            group_id = 10
            numerator = "$(cpu.busy)"
            denominator = "$#"
            endpoint = "cluster-web"
            metric = "second"
            step = 60
            "#,
        )?;

        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions["1"].metric, "second");
        Ok(())
    }

    #[test]
    fn empty_document_has_no_definitions() -> anyhow::Result<()> {
        assert!(parse_definitions("")?.is_empty());
        Ok(())
    }

    #[test]
    fn oversized_step_definitions_are_skipped() -> anyhow::Result<()> {
        let definitions = parse_definitions(
            r#"
            [[cluster]]
            id = 1
            group_id = 10
            numerator = "$(cpu.busy)"
            denominator = "$#"
            endpoint = "cluster-web"
            metric = "cluster.cpu.busy"
            step = 9223372036854775807

            [[cluster]]
            id = 2
            group_id = 10
            numerator = "$(cpu.busy)"
            denominator = "$#"
            endpoint = "cluster-web"
            metric = "cluster.cpu.busy.yearly"
            step = 31622400
            "#,
        )?;

        assert_eq!(definitions.keys().collect::<Vec<_>>(), vec!["2"]);
        Ok(())
    }

    #[test]
    fn schedulable_step_range() {
        let mut definition = sample_definition();
        assert!(definition.is_schedulable());

        definition.step = 0;
        assert!(!definition.is_schedulable());

        definition.step = MAX_STEP_S;
        assert!(definition.is_schedulable());

        definition.step = MAX_STEP_S + 1;
        assert!(!definition.is_schedulable());
    }

    #[test]
    fn display_lists_fields() {
        assert_eq!(
            sample_definition().to_string(),
            "<Id:7, GroupId:3, Numerator:$(cpu.busy), Denominator:$#, Endpoint:cluster-web, Metric:cluster.cpu.busy, Tags:role=web, DsType:GAUGE, Step:60>"
        );
    }
}
