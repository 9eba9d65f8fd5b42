pub mod cli;
pub mod config;
pub mod groups;
pub mod listing;
pub mod store;

mod shutdown;

use std::sync::Arc;

use cluster_aggregator_core::prelude::ShutdownHandle;
use cluster_aggregator_influx::{InfluxMetricFetcher, InfluxPublishSink};
use cluster_aggregator_runner::prelude::{
    prepare_expressions, AggregationRunner, DefinitionStore, Reconciler, TaskRegistry,
};

use crate::cli::AggregatorCli;
use crate::config::{load_config, AggregatorConfig};
use crate::groups::StaticHostGroups;
use crate::store::FileDefinitionStore;

/// Run the aggregator until Ctrl-C, or just validate the configuration with `--check`.
pub async fn run(cli: AggregatorCli) -> anyhow::Result<()> {
    let config = load_config(&cli.config)?;
    let store = FileDefinitionStore::new(&config.definitions_path);

    if cli.check {
        return check(&config, &store).await;
    }

    let groups = StaticHostGroups::new(config.host_groups()?);
    log::info!(
        "Loaded {} host group(s), reading definitions from {}",
        groups.len(),
        store.path().display()
    );

    let shutdown = shutdown::start_shutdown_listener();

    // Stopped separately so aggregates from cycles that finish during shutdown are still written.
    let writer_shutdown = ShutdownHandle::new();
    let client = config.influx.client();
    let (sink, writer_handle) = InfluxPublishSink::start(
        client.clone(),
        config.influx.measurement_tag.as_str(),
        writer_shutdown.new_listener(),
    );
    let fetcher = InfluxMetricFetcher::new(client, config.influx.measurement_tag.as_str());

    let runner = Arc::new(AggregationRunner::new(
        Arc::new(groups),
        Arc::new(fetcher),
        Arc::new(sink),
    ));
    let store: Arc<dyn DefinitionStore> = Arc::new(store);

    let listing_handle = cli
        .listen
        .or(config.listen)
        .map(|addr| listing::spawn(addr, store.clone(), shutdown.new_listener()));

    let reconciler = Reconciler::new(store, TaskRegistry::new(runner), config.reconcile_interval());
    reconciler.run(shutdown.new_listener()).await;

    writer_shutdown.shutdown();
    if let Err(e) = writer_handle.await {
        log::warn!("Publisher did not stop cleanly: {e:?}");
    }

    if let Some(listing_handle) = listing_handle {
        if let Err(e) = listing_handle.await {
            log::warn!("Listing endpoint did not stop cleanly: {e:?}");
        }
    }

    log::info!("Shutdown complete");

    Ok(())
}

/// Print what would be scheduled, and why anything would not be.
async fn check(config: &AggregatorConfig, store: &FileDefinitionStore) -> anyhow::Result<()> {
    let groups = config.host_groups()?;
    let definitions = store.read().await?;

    println!(
        "InfluxDB {} database {}, hosts tagged `{}`",
        config.influx.host, config.influx.database, config.influx.measurement_tag
    );
    println!(
        "{} host group(s), reconciling every {:?}",
        groups.len(),
        config.reconcile_interval()
    );
    println!("{} definition(s) in {}", definitions.len(), store.path().display());

    for definition in definitions.values() {
        let status = match prepare_expressions(definition) {
            Ok(_) if !groups.contains_key(&definition.group_id) => {
                format!("unknown host group {}", definition.group_id)
            }
            Ok(_) => "ok".to_string(),
            Err(abort) => abort.to_string(),
        };
        println!("{definition} {status}");
    }

    Ok(())
}
