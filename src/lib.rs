//! WebSocket upgrade gateway library.
//!
//! Accepts HTTP/1.1 connections, upgrades them to WebSocket on a configured
//! path, and routes every text frame to a per-connection worker whose reply
//! is written back on the same connection.

pub mod broker;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod websocket;
pub mod worker;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
pub use worker::{FnWorkerFactory, UppercaseWorker, Worker, WorkerError, WorkerFactory};
