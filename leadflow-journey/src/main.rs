//! leadflow-journey - Lead journey service
//!
//! Serves per-lead journeys and pipeline counts over HTTP and runs the
//! compliance reconciliation poller in the background.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leadflow_common::config::{ensure_root_folder, resolve_root_folder, TomlConfig};
use leadflow_journey::db;
use leadflow_journey::poller::{
    ComplianceResultProvider, LeadStore, LocalMarkerFile, PollerConfig, ProcessedMarkers, ReconciliationPoller,
};
use leadflow_journey::sources::{JourneySource, RestSource, SqliteStore};
use leadflow_journey::{AppState, JourneyService};

/// Command-line arguments for leadflow-journey
#[derive(Parser, Debug)]
#[command(name = "leadflow-journey")]
#[command(about = "Lead journey aggregation and compliance reconciliation service")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides config)
    #[arg(short, long, env = "LEADFLOW_PORT")]
    port: Option<u16>,

    /// Root folder for the database and marker file
    #[arg(short, long, env = "LEADFLOW_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Config file (default: ~/.config/leadflow/config.toml)
    #[arg(short, long, env = "LEADFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Default tenant for requests without ?tenant=
    #[arg(short, long, env = "LEADFLOW_TENANT_ID")]
    tenant: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TomlConfig::load_or_default(args.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    config
        .apply_env_overrides()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    init_tracing(&config)?;

    info!("Starting leadflow-journey v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Build: {} ({}, {})",
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    // Root folder and database
    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    ensure_root_folder(&root_folder)
        .map_err(|e| anyhow::anyhow!("Failed to initialize root folder: {}", e))?;
    info!("Root folder: {}", root_folder.display());

    let db_path = config.database_path(&root_folder);
    info!("Database: {}", db_path.display());
    let pool = db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;
    db::contacts::backfill_normalized_keys(&pool)
        .await
        .context("Failed to backfill normalized keys")?;

    let store = Arc::new(SqliteStore::new(pool.clone(), config.fetch_limit));

    // With a remote data API configured, journeys and reconciliation both go
    // through it so the poller writes the rows the aggregator reads
    let (source, provider, leads): (Arc<dyn JourneySource>, Arc<dyn ComplianceResultProvider>, Arc<dyn LeadStore>) =
        match &config.remote {
            Some(remote) => {
                info!("Data source: remote data API at {}", remote.base_url);
                let rest = Arc::new(
                    RestSource::new(remote, config.fetch_limit, config.fetch_timeout())
                        .map_err(|e| anyhow::anyhow!("Failed to build remote source: {}", e))?,
                );
                (rest.clone(), rest.clone(), rest)
            }
            None => {
                info!("Data source: local database");
                (store.clone(), store.clone(), store)
            }
        };
    let journeys = Arc::new(JourneyService::new(source, config.fetch_timeout()));

    // Reconciliation poller
    let interval_secs = db::settings::get_poll_interval_secs(&pool, config.poll_interval_secs)
        .await
        .context("Failed to read poll interval setting")?;
    let marker_path = config.marker_file(&root_folder);
    info!("Local marker file: {}", marker_path.display());
    let markers = ProcessedMarkers::new(provider.clone(), LocalMarkerFile::open(marker_path).await);
    let poller = Arc::new(ReconciliationPoller::new(
        provider,
        leads,
        markers,
        PollerConfig {
            interval: std::time::Duration::from_secs(interval_secs),
            call_timeout: config.fetch_timeout(),
        },
    ));
    poller.start().await;

    let default_tenant = args.tenant.or_else(|| config.tenant_id.clone());
    if default_tenant.is_none() {
        warn!("No default tenant configured; requests must pass ?tenant=");
    }

    let state = AppState::new(journeys, Arc::clone(&poller), default_tenant);
    let app = leadflow_journey::build_router(state);

    let port = args.port.unwrap_or(config.port);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    poller.stop().await;
    info!("Server shutdown complete");
    Ok(())
}

/// `RUST_LOG` wins; otherwise the configured level for this crate
fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "leadflow_journey={level},leadflow_common={level},tower_http=info",
            level = config.logging.level
        )
        .into()
    });

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
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
