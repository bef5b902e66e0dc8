//! Sync Agent - Main entry point

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use futures_util::stream::{self, StreamExt};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sync_agent::catalog::{find_duplicate_files, find_duplicate_folders, CatalogBuilder};
use sync_agent::digest::DigestAlgorithm;
use sync_agent::transfer::progress::{format_bytes, format_duration, format_speed};
use sync_agent::transfer::{ProgressCallback, ProgressEvent};
use sync_agent::{api, config::Config, daemon::shutdown::ShutdownCoordinator, utils};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the control API until interrupted (default)
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Sync every configured resource once and exit
    Run {
        /// Only sync this resource
        #[arg(short, long)]
        resource: Option<String>,
    },
    /// Report duplicate files and folders under a directory
    Dupes {
        path: PathBuf,

        /// Digest used to compare contents
        #[arg(short, long, default_value = "xor32")]
        algorithm: DigestAlgorithm,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    match args.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => serve(config, port).await,
        Command::Run { resource } => run_once(config, resource).await,
        Command::Dupes { path, algorithm } => dupes(path, algorithm).await,
    }
}

async fn serve(config: Config, port: Option<u16>) -> Result<()> {
    api::health::init_start_time();

    tracing::info!(
        "Starting sync-agent v{} (agent_id: {})",
        env!("CARGO_PKG_VERSION"),
        config.agent.id
    );

    let port = port.unwrap_or(config.agent.port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let shutdown_coordinator = ShutdownCoordinator::new();
    let app_state = api::create_app_state(config, shutdown_coordinator.token());
    let app = api::create_router_with_state(app_state.clone());

    tracing::info!("Listening on http://{}", addr);
    tracing::info!(
        resources = app_state.config.resources.len(),
        server = %app_state.config.server.url,
        "Sync endpoints: POST /sync/start, POST /sync/cancel, GET /sync/status"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server_token = shutdown_coordinator.token();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_token.cancelled().await });
    let server_handle = tokio::spawn(async move { server.await });

    shutdown_coordinator.wait_for_signal().await;
    shutdown_coordinator
        .shutdown(&app_state.job_tracker, Duration::from_secs(10))
        .await;

    match tokio::time::timeout(Duration::from_secs(5), server_handle).await {
        Ok(Ok(Ok(()))) => tracing::info!("Server shutdown complete"),
        Ok(Ok(Err(e))) => tracing::error!("Server error during shutdown: {}", e),
        Ok(Err(e)) => tracing::error!("Server task panicked: {}", e),
        Err(_) => tracing::warn!("Server shutdown timeout, forcing exit"),
    }

    Ok(())
}

fn print_progress() -> ProgressCallback {
    Arc::new(|event| match event {
        ProgressEvent::Scan(scan) => tracing::info!(
            folders = scan.folders_scanned,
            files = scan.files_scanned,
            bytes = %format_bytes(scan.bytes_scanned),
            "Scanning"
        ),
        ProgressEvent::Transfer(transfer) => tracing::info!(
            "Transferred {} / {} ({:.1}%), {}, ETA {}",
            format_bytes(transfer.transferred_bytes),
            format_bytes(transfer.total_bytes),
            transfer.percent_complete,
            format_speed(transfer.bytes_per_second),
            format_duration(transfer.eta_seconds)
        ),
    })
}

async fn run_once(config: Config, only: Option<String>) -> Result<()> {
    let resources: Vec<_> = config
        .resources
        .iter()
        .filter(|r| only.as_deref().is_none_or(|name| r.name == name))
        .cloned()
        .collect();
    if resources.is_empty() {
        bail!("no matching resources configured");
    }

    let shutdown_coordinator = ShutdownCoordinator::new();
    let token = shutdown_coordinator.token();
    let signal_task = tokio::spawn(async move { shutdown_coordinator.wait_for_signal().await });

    let mut drivers = Vec::with_capacity(resources.len());
    for resource in &resources {
        drivers.push(
            config
                .driver_for(resource)?
                .with_cancel(token.child_token())
                .with_progress(print_progress()),
        );
    }

    let reports: Vec<_> = stream::iter(drivers)
        .map(|driver| async move { driver.run().await })
        .buffer_unordered(config.performance.max_concurrent_syncs.max(1))
        .collect()
        .await;
    signal_task.abort();

    let mut all_ok = true;
    for report in &reports {
        println!("{}", serde_json::to_string_pretty(report)?);
        all_ok &= report.is_complete_success();
    }
    if !all_ok {
        bail!("one or more resources did not sync completely");
    }
    Ok(())
}

async fn dupes(path: PathBuf, algorithm: DigestAlgorithm) -> Result<()> {
    let outcome = tokio::task::spawn_blocking(move || {
        CatalogBuilder::new(&path)
            .hashed(algorithm)
            .with_folders()
            .build()
    })
    .await??;

    for issue in &outcome.issues {
        tracing::warn!(path = %issue.relative_path, "{}", issue.message);
    }

    let folders = find_duplicate_folders(&outcome.catalog);
    for group in &folders {
        println!(
            "Identical folders ({} files, {} each):",
            group.file_count,
            format_bytes(group.total_bytes)
        );
        for folder in &group.folders {
            println!("  {}/", folder);
        }
    }

    let files = find_duplicate_files(&outcome.catalog);
    for group in &files {
        println!(
            "Duplicate files ({} each, {} wasted, {} {}):",
            format_bytes(group.size),
            format_bytes(group.wasted_bytes()),
            algorithm,
            group.digest
        );
        for path in &group.paths {
            println!("  {}", path);
        }
    }

    println!(
        "{} duplicate folder groups, {} duplicate file groups",
        folders.len(),
        files.len()
    );
    Ok(())
}
