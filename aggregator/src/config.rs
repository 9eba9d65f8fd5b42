use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;

const DEFAULT_RECONCILE_INTERVAL_S: u64 = 60;
const DEFAULT_MEASUREMENT_TAG: &str = "endpoint";

#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    /// The definitions file. Relative paths are resolved against the config file's directory.
    pub definitions_path: PathBuf,
    #[serde(default = "default_reconcile_interval_s")]
    pub reconcile_interval_s: u64,
    /// Address for the read-only definition listing, disabled when absent.
    #[serde(default)]
    pub listen: Option<SocketAddr>,
    #[serde(default)]
    pub influx: InfluxConfig,
    /// Host group id to member hosts, in the order they should be evaluated.
    #[serde(default)]
    pub host_groups: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InfluxConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub database: String,
    /// The tag that identifies a host on counters, and the endpoint on published aggregates.
    #[serde(default = "default_measurement_tag")]
    pub measurement_tag: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            database: String::new(),
            measurement_tag: default_measurement_tag(),
            token: None,
        }
    }
}

impl InfluxConfig {
    pub fn client(&self) -> influxdb::Client {
        let client = influxdb::Client::new(self.host.as_str(), self.database.as_str());
        match &self.token {
            Some(token) => client.with_token(token.as_str()),
            None => client,
        }
    }
}

impl AggregatorConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_s)
    }

    /// The `[host_groups]` table keyed by numeric group id.
    pub fn host_groups(&self) -> anyhow::Result<HashMap<u64, Vec<String>>> {
        self.host_groups
            .iter()
            .map(|(id, hosts)| {
                let id = id
                    .parse::<u64>()
                    .with_context(|| format!("Host group id must be a number, got `{id}`"))?;
                Ok((id, hosts.clone()))
            })
            .collect()
    }

    /// Replace connection details with values from `lookup`, which is normally the environment.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("INFLUX_HOST") {
            self.influx.host = host;
        }
        if let Some(database) = lookup("INFLUX_BUCKET") {
            self.influx.database = database;
        }
        if let Some(token) = lookup("INFLUX_TOKEN") {
            self.influx.token = Some(token);
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.reconcile_interval_s == 0 {
            bail!("`reconcile_interval_s` must be greater than zero");
        }
        if self.influx.host.trim().is_empty() {
            bail!("No InfluxDB host configured, set `influx.host` or `INFLUX_HOST`");
        }
        if self.influx.database.trim().is_empty() {
            bail!("No InfluxDB database configured, set `influx.database` or `INFLUX_BUCKET`");
        }
        if self.influx.measurement_tag.trim().is_empty() {
            bail!("`influx.measurement_tag` must not be empty");
        }
        self.host_groups()?;

        Ok(())
    }
}

/// Load and validate the configuration file, applying `INFLUX_*` environment overrides.
pub fn load_config(path: &Path) -> anyhow::Result<AggregatorConfig> {
    load_config_with(path, |name| std::env::var(name).ok())
}

fn load_config_with(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<AggregatorConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let mut config: AggregatorConfig = toml::from_str(&content)
        .with_context(|| format!("Invalid config file {}", path.display()))?;

    if config.definitions_path.is_relative() {
        if let Some(dir) = path.parent() {
            config.definitions_path = dir.join(&config.definitions_path);
        }
    }

    config.apply_overrides(lookup);
    config.validate()?;

    Ok(config)
}

fn default_reconcile_interval_s() -> u64 {
    DEFAULT_RECONCILE_INTERVAL_S
}

fn default_measurement_tag() -> String {
    DEFAULT_MEASUREMENT_TAG.to_string()
}
