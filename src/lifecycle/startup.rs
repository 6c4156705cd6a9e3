//! Startup orchestration.
//!
//! # Responsibilities
//! - Start the metrics exporter when enabled
//! - Bind the listener and announce where to point a browser
//! - Wire OS signals to the shutdown coordinator
//! - Run the gateway until it has drained
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener binds last, so traffic only arrives once everything is ready

use std::net::SocketAddr;

use tracing::info;

use crate::config::GatewayConfig;
use crate::http::GatewayServer;
use crate::lifecycle::{signals, Shutdown};
use crate::net::listener::Listener;
use crate::observability::metrics;

/// Run the gateway with the given configuration until a shutdown signal.
pub async fn run(config: GatewayConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = Listener::bind(&config.listener).await?;
    let local_addr = listener.local_addr()?;
    info!("Web socket server started at port {}.", local_addr.port());
    info!(
        "Open your browser and navigate to http://localhost:{}/",
        local_addr.port()
    );

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        trigger.trigger();
    });

    GatewayServer::new(config)
        .run(listener, server_shutdown)
        .await?;

    info!("Shutdown complete");
    Ok(())
}
