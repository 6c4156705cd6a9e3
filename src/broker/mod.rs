//! Request broker: text frames to worker round trips.
//!
//! # Data Flow
//! ```text
//! dispatcher ── submit(connection, payload) ──▶ spawned task
//!                                                 │ PendingRequest::resolve
//!                                                 ├─ reply    → Frame::Text → outbox
//!                                                 ├─ failure  → failure policy
//!                                                 └─ closed   → dropped, logged
//! ```
//!
//! # Design Decisions
//! - `submit` never blocks the session loop; every round trip runs in its
//!   own task, so several requests per connection may be in flight
//! - Replies are written in completion order
//! - The broker never touches the socket; it only delivers to the outbox

pub mod pending;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{BrokerConfig, FailurePolicy};
use crate::error::GatewayError;
use crate::net::connection::Connection;
use crate::observability::metrics;
use crate::websocket::frame::{Frame, CLOSE_INTERNAL_ERROR};

pub use pending::{PendingRequest, Resolution};

/// Body of the text frame sent under [`FailurePolicy::ErrorFrame`].
#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    error: &'static str,
    request_id: Uuid,
    message: &'a str,
}

/// Correlates text payloads with worker replies under a bounded wait.
#[derive(Debug, Clone)]
pub struct RequestBroker {
    timeout: Duration,
    failure_policy: FailurePolicy,
}

impl RequestBroker {
    pub fn new(config: &BrokerConfig) -> Self {
        Self {
            timeout: config.request_timeout(),
            failure_policy: config.failure_policy,
        }
    }

    /// Send `payload` to the connection's worker and deliver the outcome.
    pub fn submit(&self, connection: &Arc<Connection>, payload: String) {
        let Some(worker) = connection.worker() else {
            debug!(connection_id = %connection.id(), "Connection closed, request dropped");
            return;
        };

        let pending = PendingRequest::new(connection.id(), self.timeout);
        let request_id = pending.id();
        let connection = Arc::clone(connection);
        let policy = self.failure_policy;
        let span = info_span!("request", connection_id = %connection.id(), request_id = %request_id);

        tokio::spawn(
            async move {
                let started = Instant::now();
                match pending.resolve(&worker, payload, connection.closed()).await {
                    Resolution::Replied(reply) => {
                        metrics::record_worker_request("replied", started);
                        if !connection.deliver(Frame::Text(reply)).await {
                            debug!("Connection closed before reply was delivered");
                        }
                    }
                    Resolution::Failed(err) => {
                        let outcome = match err {
                            GatewayError::WorkerTimeout { .. } => "timeout",
                            _ => "failed",
                        };
                        metrics::record_worker_request(outcome, started);
                        warn!(error = %err, policy = ?policy, "Worker request failed");
                        apply_failure_policy(&connection, policy, request_id, &err).await;
                    }
                    Resolution::Cancelled => {
                        metrics::record_worker_request("cancelled", started);
                        debug!("Connection closed while request pending, cancelled");
                    }
                }
            }
            .instrument(span),
        );
    }
}

async fn apply_failure_policy(
    connection: &Connection,
    policy: FailurePolicy,
    request_id: Uuid,
    err: &GatewayError,
) {
    match policy {
        FailurePolicy::ErrorFrame => {
            connection.deliver(error_frame(request_id, err)).await;
        }
        FailurePolicy::Close => {
            connection
                .deliver(Frame::close(CLOSE_INTERNAL_ERROR, err.kind()))
                .await;
            connection.close();
        }
    }
}

/// JSON error envelope as a text frame.
pub fn error_frame(request_id: Uuid, err: &GatewayError) -> Frame {
    let message = err.to_string();
    let envelope = ErrorEnvelope {
        error: err.kind(),
        request_id,
        message: &message,
    };
    match serde_json::to_string(&envelope) {
        Ok(body) => Frame::Text(body),
        Err(_) => Frame::Text(format!(r#"{{"error":"{}"}}"#, err.kind())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::ConnectionState;
    use crate::worker::{FnWorkerFactory, UppercaseWorker, Worker, WorkerError, WorkerFactory};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct Stalled;

    #[async_trait]
    impl Worker for Stalled {
        async fn handle(&mut self, _payload: String) -> Result<String, WorkerError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    struct Broken;

    #[async_trait]
    impl Worker for Broken {
        async fn handle(&mut self, _payload: String) -> Result<String, WorkerError> {
            Err(WorkerError::Failed("no capacity".into()))
        }
    }

    fn broker(policy: FailurePolicy) -> RequestBroker {
        RequestBroker::new(&BrokerConfig {
            request_timeout_ms: 200,
            failure_policy: policy,
            ..BrokerConfig::default()
        })
    }

    fn upgraded(factory: &dyn WorkerFactory) -> (Arc<Connection>, mpsc::Receiver<Frame>) {
        let connection = Connection::new("127.0.0.1:5000".parse().unwrap(), factory);
        let (tx, rx) = mpsc::channel(8);
        connection.upgrade(tx).unwrap();
        (connection, rx)
    }

    fn envelope(frame: Frame) -> serde_json::Value {
        match frame {
            Frame::Text(body) => serde_json::from_str(&body).unwrap(),
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn reply_is_delivered_as_text() {
        let (connection, mut rx) = upgraded(&FnWorkerFactory::new(|_| UppercaseWorker, 4));
        broker(FailurePolicy::ErrorFrame).submit(&connection, "hello".into());
        assert_eq!(rx.recv().await, Some(Frame::Text("HELLO".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_sends_error_envelope_and_keeps_connection() {
        let (connection, mut rx) = upgraded(&FnWorkerFactory::new(|_| Stalled, 4));
        broker(FailurePolicy::ErrorFrame).submit(&connection, "slow".into());

        let body = envelope(rx.recv().await.unwrap());
        assert_eq!(body["error"], "worker_timeout");
        assert!(Uuid::parse_str(body["request_id"].as_str().unwrap()).is_ok());
        assert_eq!(connection.state(), ConnectionState::Upgraded);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_under_close_policy_closes_with_1011() {
        let (connection, mut rx) = upgraded(&FnWorkerFactory::new(|_| Stalled, 4));
        broker(FailurePolicy::Close).submit(&connection, "slow".into());

        assert_eq!(
            rx.recv().await,
            Some(Frame::close(CLOSE_INTERNAL_ERROR, "worker_timeout"))
        );
        connection.closed().await;
        assert!(connection.is_closed());
    }

    #[tokio::test]
    async fn worker_failure_sends_envelope() {
        let (connection, mut rx) = upgraded(&FnWorkerFactory::new(|_| Broken, 4));
        broker(FailurePolicy::ErrorFrame).submit(&connection, "x".into());

        let body = envelope(rx.recv().await.unwrap());
        assert_eq!(body["error"], "worker_failure");
        assert!(body["message"].as_str().unwrap().contains("no capacity"));
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_pending_without_writing() {
        let (connection, mut rx) = upgraded(&FnWorkerFactory::new(|_| Stalled, 4));
        broker(FailurePolicy::ErrorFrame).submit(&connection, "slow".into());
        tokio::task::yield_now().await;
        connection.close();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn submit_after_close_is_noop() {
        let (connection, mut rx) = upgraded(&FnWorkerFactory::new(|_| UppercaseWorker, 4));
        connection.close();
        broker(FailurePolicy::ErrorFrame).submit(&connection, "late".into());
        assert_eq!(rx.recv().await, None);
    }
}
