//! services/pulse_api/src/bin/api.rs

use pulse_api::{
    app::{build_router, build_state, Storage},
    config::Config,
    error::ApiError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long shutdown waits for queued presence writes.
const PRESENCE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect Storage ---
    let storage = Storage::connect(&config).await?;

    // --- 3. Reconcile Presence & Build the Shared AppState ---
    // Must finish before the listener accepts any socket.
    let (app_state, presence_writer) = build_state(config.clone(), storage).await?;

    // --- 4. Create the Web Router ---
    let hub = app_state.hub.clone();
    let connections = app_state.connections.clone();
    let app = build_router(app_state)?;

    // --- 5. Start the Server ---
    let shutdown = CancellationToken::new();
    tokio::spawn(watch_ctrl_c(shutdown.clone()));

    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    // --- 6. Take Connected Users Offline & Drain Presence Writes ---
    info!(
        open_connections = connections.len().await,
        "Server stopped. Taking connected users offline..."
    );
    let offline = hub.shutdown().await;
    info!(users = offline, "Flushing presence writes...");
    if tokio::time::timeout(PRESENCE_DRAIN_TIMEOUT, presence_writer.finish())
        .await
        .is_err()
    {
        warn!("Presence writes still pending at shutdown; the next startup will reconcile them.");
    }

    Ok(())
}

async fn watch_ctrl_c(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received.");
    shutdown.cancel();
}
