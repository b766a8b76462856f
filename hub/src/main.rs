mod clock;
mod config;
mod error;
mod freshness;
mod routes;
mod series;
mod snapshot;
mod state;
mod store;
#[cfg(test)]
mod test_support;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use clock::SystemClock;
use config::HubConfig;
use state::AppState;
use store::{InfluxClient, StoreGuard};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = HubConfig::from_env();
    let addr: SocketAddr = format!("{}:{}", cfg.bind, cfg.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", cfg.bind, cfg.port))?;

    tracing::info!(
        "Connecting to InfluxDB at {} (bucket={}, timeout={:?}, retries={})",
        cfg.influx_url,
        cfg.influx_bucket,
        cfg.store_timeout,
        cfg.store_retries
    );
    let store = Arc::new(InfluxClient::connect(&cfg).context("build InfluxDB client")?);
    // Released on every exit path below, including early returns and panics.
    let guard = StoreGuard::new(Arc::clone(&store));

    if let Err(e) = store.ping().await {
        tracing::warn!("InfluxDB not reachable yet, queries will retry per request: {e}");
    }

    let state = AppState::new(cfg, Arc::clone(&store), Arc::new(SystemClock));
    let app = routes::app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!("Coin Predict API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Closing InfluxDB connection...");
    drop(guard);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received, gracefully stopping…");
}
