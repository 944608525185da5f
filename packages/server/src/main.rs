use std::sync::Arc;

use api::{AppConfig, init_services, router};
use backend::HttpImageBackend;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = AppConfig::from_env()?;
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");
    for warning in config.startup_warnings() {
        tracing::warn!("{}", warning);
    }

    // --- Services ---
    let backend = HttpImageBackend::new(config.backend.clone())?;
    let services = init_services(&config, Arc::new(backend)).await?;

    // Log job lifecycle events.
    let mut events = services.state.events.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::debug!("{}", event.description()),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Event log skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // --- Start server ---
    let app = router(services.state.clone());
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(addr = %listener.local_addr()?, "Starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped, shutting down job runtime");
    services.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
