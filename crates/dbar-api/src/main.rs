//! # dbar-api: Binary Entry Point
//!
//! Reads configuration from the environment, selects the storage backend,
//! installs the Prometheus recorder and serves the Axum app.

use dbar_api::config::{AppConfig, LogFormat};
use dbar_api::state::{self, AppState};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    tracing::info!(?config, "starting dbar-api");
    if config.static_credential.is_none() {
        tracing::warn!(
            "MERCHANT_ID/HASH_KEY/HASH_IV not fully set; tenants without a stored credential cannot take payments"
        );
    }

    let store = state::open_store(&config).await.map_err(|e| {
        tracing::error!("Storage initialization failed: {e}");
        e
    })?;

    let port = config.port;
    let mut state = AppState::new(config, store);
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => state = state.with_prometheus(handle),
        Err(e) => tracing::warn!("Prometheus recorder not installed: {e}"),
    }

    let app = dbar_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("dbar-api listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
