//! Read-only HTTP view of the current definitions.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use cluster_aggregator_core::prelude::DelegatedShutdownListener;
use cluster_aggregator_runner::prelude::DefinitionStore;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub fn router(store: Arc<dyn DefinitionStore>) -> Router {
    Router::new()
        .route("/items", get(items_handler))
        .with_state(store)
}

/// Serve the listing in the background until shutdown.
///
/// A failure to bind or serve is logged as soon as it happens, the handle only reports panics.
pub fn spawn(
    addr: SocketAddr,
    store: Arc<dyn DefinitionStore>,
    shutdown_listener: DelegatedShutdownListener,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = serve(addr, store, shutdown_listener).await {
            log::error!("{e:#}");
        }
    })
}

/// Serve the listing until shutdown.
pub async fn serve(
    addr: SocketAddr,
    store: Arc<dyn DefinitionStore>,
    mut shutdown_listener: DelegatedShutdownListener,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind listing endpoint to {addr}"))?;
    log::info!("Listing definitions on http://{}/items", listener.local_addr()?);

    axum::serve(listener, router(store))
        .with_graceful_shutdown(async move { shutdown_listener.wait_for_shutdown().await })
        .await
        .context("Listing endpoint failed")
}

/// One definition per line, or the store error.
async fn items_handler(State(store): State<Arc<dyn DefinitionStore>>) -> String {
    match store.read_all_active_definitions().await {
        Ok(definitions) => definitions
            .values()
            .map(|definition| format!("{definition}\n"))
            .collect(),
        Err(e) => format!("{e:#}\n"),
    }
}
