//! Minuteur Offline - offline cache host for the Minuteur Cuisine kitchen timer

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;

use config::{Config, LogFormat, StorageBackendKind};
use minuteur_api::{AppState, apply_effects, create_router};
use minuteur_core::{OfflineCacheManager, spawn_refresh_task};
use minuteur_proxy::{Fetcher, OriginClient, OriginClientConfig};
use minuteur_storage::{CacheStore, LocalStore, MemoryStore};

/// Minuteur Offline - serves the kitchen timer from cache when the origin is down
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Bind address
    #[arg(long, env = "MINUTEUR_OFFLINE_BIND")]
    bind: Option<String>,

    /// Port
    #[arg(short, long, env = "MINUTEUR_OFFLINE_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    init_logging(&config.logging.level, config.logging.format);

    info!("Starting Minuteur Offline v{}", env!("CARGO_PKG_VERSION"));

    let metrics_handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(Arc::new(handle)),
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            None
        }
    };

    // Initialize the partition store
    let store: Arc<dyn CacheStore> = match config.storage.backend {
        StorageBackendKind::Memory => {
            info!("Using in-memory cache store");
            Arc::new(MemoryStore::new())
        }
        StorageBackendKind::Local => {
            tokio::fs::create_dir_all(&config.storage.local.path).await?;
            Arc::new(LocalStore::new(&config.storage.local.path).await?)
        }
    };

    // Initialize the origin client
    let fetcher: Arc<dyn Fetcher> = Arc::new(OriginClient::new(OriginClientConfig {
        origin: config.origin.url.clone(),
        username: config.origin.username.clone(),
        password: config.origin.password.clone(),
        skip_tls_verify: config.origin.skip_tls_verify,
    })?);

    let manager = Arc::new(OfflineCacheManager::new(
        config.offline_config(),
        store,
        fetcher.clone(),
    )?);

    let state = AppState::new(manager.clone(), fetcher);

    // Install and take over; a failed install leaves the host serving
    // straight from the network
    match manager.install().await {
        Ok(report) => apply_effects(&state, &report.effects).await?,
        Err(e) => warn!("Serving without offline support: {}", e),
    }

    if config.refresh.enabled {
        spawn_refresh_task(manager.clone(), config.refresh.interval_hours);
    }

    let app = create_router(state, metrics_handle).layer(TraceLayer::new_for_http());

    let bind_addr = args.bind.unwrap_or(config.server.bind_address);
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", bind_addr, port).parse()?;

    info!("Listening on {}", addr);
    info!("Origin: {}", config.origin.url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let in-flight cache writes land before exiting
    manager.settle().await;

    info!("Server stopped");
    Ok(())
}

/// Initialize logging
fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Shutdown signal received");
}
