//! Configuration reload on SIGHUP.

use crate::config::AppConfig;
use crate::state::AppState;
use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Re-read the config file and swap in the new registry.
pub fn reload(state: &AppState) -> anyhow::Result<u64> {
    let path = state
        .config_path
        .as_deref()
        .context("server was started without a config file")?;
    let config = AppConfig::load(path)?;
    let resources = config.resources.len();
    let users = config.users.len();
    let generation = state.install(config)?;

    tracing::info!(generation, resources, users, path = %path.display(), "Configuration reloaded");
    Ok(generation)
}

#[cfg(unix)]
pub fn spawn_reload_on_sighup(state: Arc<AppState>, cancel: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Failed to listen for SIGHUP, reload disabled: {}", e);
                return;
            }
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    if let Err(e) = reload(&state) {
                        tracing::error!("Reload failed, keeping previous configuration: {e:#}");
                    }
                }
            }
        }
    });
}

#[cfg(not(unix))]
pub fn spawn_reload_on_sighup(_state: Arc<AppState>, _cancel: CancellationToken) {
    tracing::info!("SIGHUP reload is not available on this platform");
}
