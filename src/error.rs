//! Error taxonomy for the gateway.
//!
//! # Design Decisions
//! - Protocol violations are connection-scoped: the connection task logs them
//!   and closes its own transport, never the process
//! - Startup errors (listener, config) live next to their subsystems

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::net::connection::ConnectionState;

/// Errors raised while serving a single connection.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Unparseable HTTP or invalid upgrade headers.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Aggregated request body exceeds the configured bound.
    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    /// Handshake asked for a WebSocket version we do not speak.
    #[error("unsupported WebSocket version: {0}")]
    UnsupportedProtocolVersion(String),

    /// A frame other than text/ping/pong/close arrived after the upgrade.
    #[error("{0} frame types not supported")]
    UnsupportedFrameType(String),

    /// Text frame exceeds the configured limit.
    #[error("message size {0} exceeds limit {1}")]
    MessageTooLarge(usize, usize),

    /// The worker did not answer within the request deadline.
    #[error("worker did not reply to request {request_id} within {after:?}")]
    WorkerTimeout { request_id: Uuid, after: Duration },

    /// The worker answered with an error, or is gone.
    #[error("worker failed request {request_id}: {reason}")]
    WorkerFailure { request_id: Uuid, reason: String },

    /// A state change that the connection lifecycle does not allow.
    #[error("invalid connection transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// The connection is already closed.
    #[error("connection is closed")]
    ConnectionClosed,

    /// WebSocket codec error (boxed to reduce size).
    #[error("websocket transport error: {0}")]
    Transport(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    /// HTTP codec error.
    #[error("http transport error: {0}")]
    Http(#[from] hyper::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        GatewayError::Transport(Box::new(err))
    }
}

impl GatewayError {
    /// Short stable label used for metrics and error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::MalformedRequest(_) => "malformed_request",
            GatewayError::BodyTooLarge(_) => "body_too_large",
            GatewayError::UnsupportedProtocolVersion(_) => "unsupported_protocol_version",
            GatewayError::UnsupportedFrameType(_) => "unsupported_frame_type",
            GatewayError::MessageTooLarge(..) => "message_too_large",
            GatewayError::WorkerTimeout { .. } => "worker_timeout",
            GatewayError::WorkerFailure { .. } => "worker_failure",
            GatewayError::InvalidTransition { .. } => "invalid_transition",
            GatewayError::ConnectionClosed => "connection_closed",
            GatewayError::Transport(_) | GatewayError::Http(_) | GatewayError::Io(_) => "transport",
        }
    }
}

/// Result type for connection-level operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
