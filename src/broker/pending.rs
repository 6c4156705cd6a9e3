//! A single in-flight worker round trip.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::net::connection::ConnectionId;
use crate::worker::{WorkerError, WorkerHandle};

/// How a pending request ended.
#[derive(Debug)]
pub enum Resolution {
    /// The worker answered in time.
    Replied(String),
    /// Timed out, or the worker failed. Always a worker error variant.
    Failed(GatewayError),
    /// The connection closed first; nothing should be written.
    Cancelled,
}

/// Correlation record for one text frame sent to a worker.
#[derive(Debug)]
pub struct PendingRequest {
    id: Uuid,
    connection: ConnectionId,
    timeout: Duration,
    deadline: Instant,
}

impl PendingRequest {
    pub fn new(connection: ConnectionId, timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            connection,
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Ask the worker and wait for the first of: reply, deadline, `closed`.
    ///
    /// Consumes the request, so it resolves exactly once.
    pub async fn resolve<C>(self, worker: &WorkerHandle, payload: String, closed: C) -> Resolution
    where
        C: Future<Output = ()>,
    {
        let ask = tokio::time::timeout_at(self.deadline, worker.ask(self.id, payload, self.deadline));
        tokio::select! {
            biased;
            _ = closed => Resolution::Cancelled,
            result = ask => match result {
                Ok(Ok(reply)) => Resolution::Replied(reply),
                Ok(Err(WorkerError::Failed(reason))) => Resolution::Failed(GatewayError::WorkerFailure {
                    request_id: self.id,
                    reason,
                }),
                Ok(Err(err @ WorkerError::Unavailable)) => Resolution::Failed(GatewayError::WorkerFailure {
                    request_id: self.id,
                    reason: err.to_string(),
                }),
                // The worker drops the request at the same deadline.
                Ok(Err(WorkerError::DeadlineElapsed)) | Err(_) => Resolution::Failed(GatewayError::WorkerTimeout {
                    request_id: self.id,
                    after: self.timeout,
                }),
            },
        }
    }
}
