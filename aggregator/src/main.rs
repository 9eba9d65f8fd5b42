#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cluster_aggregator::cli::init();

    cluster_aggregator::run(cli).await
}
