//! roomai-api - RoomAI job orchestration service
//!
//! Accepts room photos and design requests, runs the analysis and design
//! pipelines in the background and serves their status over HTTP and SSE.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use roomai_common::config::{ensure_root_folder, load_or_default, resolve_root_folder};
use roomai_common::events::EventBus;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roomai_api::config::ProviderCredentials;
use roomai_api::providers::Providers;
use roomai_api::retention::spawn_retention_sweeper;
use roomai_api::storage::LocalStorage;
use roomai_api::store::{build_store, fail_interrupted_jobs};
use roomai_api::AppState;

const EVENT_BUS_CAPACITY: usize = 256;

/// Command-line arguments for roomai-api
#[derive(Parser, Debug)]
#[command(name = "roomai-api")]
#[command(about = "RoomAI analysis and design job service")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides [server] port)
    #[arg(short, long, env = "ROOMAI_PORT")]
    port: Option<u16>,

    /// Root folder for the database and uploaded images
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Path to roomai.toml
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_or_default(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting roomai-api v{}", env!("CARGO_PKG_VERSION"));

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    ensure_root_folder(&root_folder).context("Failed to initialize root folder")?;
    info!("Root folder: {}", root_folder.display());

    let store = build_store(&config, &root_folder)
        .await
        .context("Failed to open job store")?;
    fail_interrupted_jobs(store.as_ref())
        .await
        .context("Failed to clean up interrupted jobs")?;

    let storage = LocalStorage::in_root_folder(&root_folder);
    tokio::fs::create_dir_all(storage.base_dir())
        .await
        .context("Failed to create upload directory")?;

    let credentials = ProviderCredentials::resolve(&config);
    let providers =
        Providers::from_config(&config, &credentials).context("Failed to build provider clients")?;

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let sweeper = spawn_retention_sweeper(store.clone(), &config.store);

    let host = config.server.host.clone();
    let port = args.port.unwrap_or(config.server.port);
    info!(
        max_concurrent_jobs = config.pipeline.max_concurrent_jobs,
        stage_timeout_secs = config.pipeline.stage_timeout_secs,
        "Pipeline executor configured"
    );

    let state = AppState::new(store, event_bus, storage, providers, config);
    let app = roomai_api::build_router(state);

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind to {}:{}", host, port))?;
    let addr = listener.local_addr().context("Failed to read listen address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.abort();
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
