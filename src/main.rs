//! WebSocket upgrade gateway.
//!
//! ```text
//!  browser ── GET / ──────────────▶ index page (echo client)
//!  browser ── GET /websocket ─────▶ handshake ─▶ 101
//!          ◀═════ text frames ═════▶ session ─▶ broker ─▶ per-connection worker
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use ws_gateway::config::loader::{load_config, ConfigError};
use ws_gateway::config::validation::validate_config;
use ws_gateway::config::{GatewayConfig, LogFormat};
use ws_gateway::lifecycle::startup;
use ws_gateway::observability::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "ws-gateway", version, about = "WebSocket upgrade gateway", long_about = None)]
struct Cli {
    /// Port to listen on; replaces the port of the configured bind address.
    port: Option<u16>,

    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level or filter directive, e.g. `debug`.
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format: pretty, compact or json.
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Cli {
    /// Load the configured file (or defaults) and apply command-line overrides.
    fn resolve_config(&self) -> Result<GatewayConfig, Box<dyn std::error::Error + Send + Sync>> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => GatewayConfig::default(),
        };

        if let Some(port) = self.port {
            let mut addr: SocketAddr = config.listener.bind_address.parse()?;
            addr.set_port(port);
            config.listener.bind_address = addr.to_string();
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    init_logging(&config.observability)?;
    tracing::info!(
        bind_address = %config.listener.bind_address,
        websocket_path = %config.websocket.path,
        max_connections = config.listener.max_connections,
        request_timeout_ms = config.broker.request_timeout_ms,
        "Configuration loaded"
    );

    startup::run(config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_argument_overrides_bind_port() {
        let cli = Cli::parse_from(["ws-gateway", "9001"]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:9001");
    }

    #[test]
    fn defaults_without_arguments() {
        let cli = Cli::parse_from(["ws-gateway"]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn log_flags_override_config() {
        let cli = Cli::parse_from(["ws-gateway", "--log-level", "debug", "--log-format", "json"]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn invalid_port_rejected_by_clap() {
        assert!(Cli::try_parse_from(["ws-gateway", "99999"]).is_err());
    }
}
