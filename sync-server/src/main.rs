mod config;
mod error;
mod models;
mod registry;
mod routes;
mod services;
mod state;

use crate::config::AppConfig;
use crate::services::reload::spawn_reload_on_sighup;
use crate::state::AppState;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config_path = AppConfig::path_from_env();
    let config = AppConfig::load(&config_path)?;
    let port = config.port;

    tracing::info!(
        config = %config_path.display(),
        resources = config.resources.len(),
        users = config.users.len(),
        workers = config.workers,
        digest = %config.digest_algorithm,
        "Starting sync server"
    );
    for resource in &config.resources {
        if !resource.root_path.is_dir() {
            tracing::warn!(
                resource = %resource.name,
                root = %resource.root_path.display(),
                "Resource root is not a directory"
            );
        }
    }

    // Build application state
    let state = Arc::new(AppState::new(config, Some(config_path))?);

    let cancel = CancellationToken::new();
    spawn_reload_on_sighup(state.clone(), cancel.clone());

    // Build router
    let app = routes::create_router(state.clone());

    // Start HTTP server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    // Graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }

    cancel.cancel();
}
