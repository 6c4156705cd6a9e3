//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges (limits > 0, timeouts > 0)
//! - Reject WebSocket paths that collide with the fixed routes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    if config.http.max_body_size == 0 {
        errors.push(ValidationError::new("http.max_body_size", "must be greater than 0"));
    }

    let path = config.websocket.path.as_str();
    if !path.starts_with('/') {
        errors.push(ValidationError::new("websocket.path", "must start with '/'"));
    } else if path == "/" || path == "/favicon.ico" {
        errors.push(ValidationError::new(
            "websocket.path",
            format!("'{}' is reserved", path),
        ));
    }
    if config.websocket.max_message_size == 0 {
        errors.push(ValidationError::new("websocket.max_message_size", "must be greater than 0"));
    }

    if config.broker.request_timeout_ms == 0 {
        errors.push(ValidationError::new("broker.request_timeout_ms", "must be greater than 0"));
    }
    if config.broker.mailbox_capacity == 0 {
        errors.push(ValidationError::new("broker.mailbox_capacity", "must be greater than 0"));
    }
    if config.broker.outbox_capacity == 0 {
        errors.push(ValidationError::new("broker.outbox_capacity", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.websocket.path = "/favicon.ico".into();
        config.broker.request_timeout_ms = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["listener.bind_address", "websocket.path", "broker.request_timeout_ms"]
        );
    }

    #[test]
    fn relative_websocket_path_rejected() {
        let mut config = GatewayConfig::default();
        config.websocket.path = "websocket".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].to_string(), "websocket.path: must start with '/'");
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = GatewayConfig::default();
        config.observability.metrics_address = "nope".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
