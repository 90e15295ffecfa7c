//! pool-relay server entry point.
//!
//! Starts the Axum HTTP server that answers connection offers and manages
//! pools.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use pool_relay::api;
use pool_relay::app_state::AppState;
use pool_relay::config::{LogFormat, RelayConfig};
use pool_relay::domain::{Manager, PoolName};
use pool_relay::error::RelayError;
use pool_relay::metrics::{RelayMetrics, install_recorder};
use pool_relay::transport::WebRtcTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = RelayConfig::from_env().context("invalid LISTEN_ADDR")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting pool-relay");

    let prometheus = install_recorder().context("installing metrics recorder")?;

    // Build domain layer
    let transport = Arc::new(WebRtcTransport::new(config.ice_gather_timeout));
    let manager = Arc::new(Manager::new(
        config.connection_config(),
        transport,
        Arc::new(RelayMetrics::new()),
        config.outbound_queue_capacity,
    ));

    for name in &config.seed_pools {
        match manager.new_pool(PoolName::from(name.as_str())).await {
            Ok(_) => {}
            Err(RelayError::DuplicateName(_)) => {
                tracing::warn!(pool = %name, "seed pool listed twice");
            }
            Err(e) => return Err(e).with_context(|| format!("seeding pool {name}")),
        }
    }

    // Build application state
    let app_state = AppState {
        manager,
        prometheus,
        max_offer_bytes: config.max_offer_bytes,
    };

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, api::app(app_state)).await?;

    Ok(())
}
