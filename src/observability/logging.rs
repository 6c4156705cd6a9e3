//! Structured logging.
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level, so operators can raise
//!   verbosity without editing the config file
//! - Pretty output for development, JSON for log shippers

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(
    config: &ObservabilityConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = build_filter(&config.log_level)?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).try_init()?,
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init()?,
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()?,
    }
    Ok(())
}

fn build_filter(level: &str) -> Result<EnvFilter, tracing_subscriber::filter::ParseError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(format!("ws_gateway={level},tower_http={level}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_parses() {
        assert!(EnvFilter::try_new("ws_gateway=debug,tower_http=debug").is_ok());
        assert!(build_filter("info").is_ok());
    }
}
