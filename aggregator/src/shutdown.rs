use cluster_aggregator_core::prelude::ShutdownHandle;
use tokio::signal;

/// Must be called from within a Tokio runtime.
pub(crate) fn start_shutdown_listener() -> ShutdownHandle {
    let handle = ShutdownHandle::default();

    let listener_handle = handle.clone();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C, stop the process another way: {e}");
            return;
        }
        log::info!("Received shutdown signal, shutting down...");
        listener_handle.shutdown();
    });

    handle
}
