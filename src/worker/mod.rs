//! Per-connection workers.
//!
//! # Data Flow
//! ```text
//! accept → WorkerFactory::spawn(connection id) → WorkerHandle (mailbox sender)
//!                                                    │
//! broker ── ask(request id, payload) ──▶ mailbox ──▶ worker task ──▶ Worker::handle
//!        ◀──────────── oneshot reply ◀─────────────────┘
//! ```
//!
//! # Design Decisions
//! - One worker task per connection; the handle is never shared across
//!   connections
//! - The worker processes its mailbox one request at a time
//! - Requests whose asker already gave up are skipped
//! - A request still running at its deadline, or whose asker went away, is
//!   dropped so the next one in the mailbox can start
//! - The task ends when every handle is dropped

pub mod uppercase;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::net::connection::ConnectionId;

pub use uppercase::UppercaseWorker;

/// Errors a worker round trip can produce.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// The worker rejected or failed to process the payload.
    #[error("{0}")]
    Failed(String),

    /// The request was still running when its deadline passed.
    #[error("worker deadline elapsed")]
    DeadlineElapsed,

    /// The worker task is gone.
    #[error("worker is not running")]
    Unavailable,
}

/// Computes a reply for each payload it receives.
#[async_trait]
pub trait Worker: Send + 'static {
    async fn handle(&mut self, payload: String) -> Result<String, WorkerError>;
}

/// A message in a worker's mailbox.
#[derive(Debug)]
pub struct WorkerRequest {
    pub request_id: Uuid,
    pub payload: String,
    pub deadline: Instant,
    pub reply: oneshot::Sender<Result<String, WorkerError>>,
}

/// Address of a running worker.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    connection: ConnectionId,
    mailbox: mpsc::Sender<WorkerRequest>,
}

impl WorkerHandle {
    /// Spawn `worker` on the runtime and return its address.
    pub fn spawn<W: Worker>(worker: W, connection: ConnectionId, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_worker(worker, rx, connection));
        Self {
            connection,
            mailbox: tx,
        }
    }

    /// Connection this worker serves.
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Send a payload and wait for the worker's reply.
    ///
    /// The worker gives up on the payload at `deadline`.
    pub async fn ask(
        &self,
        request_id: Uuid,
        payload: String,
        deadline: Instant,
    ) -> Result<String, WorkerError> {
        let (reply, rx) = oneshot::channel();
        self.mailbox
            .send(WorkerRequest {
                request_id,
                payload,
                deadline,
                reply,
            })
            .await
            .map_err(|_| WorkerError::Unavailable)?;
        rx.await.map_err(|_| WorkerError::Unavailable)?
    }

    pub fn is_running(&self) -> bool {
        !self.mailbox.is_closed()
    }
}

async fn run_worker<W: Worker>(
    mut worker: W,
    mut mailbox: mpsc::Receiver<WorkerRequest>,
    connection: ConnectionId,
) {
    while let Some(request) = mailbox.recv().await {
        let WorkerRequest {
            request_id,
            payload,
            deadline,
            mut reply,
        } = request;
        if reply.is_closed() {
            trace!(connection_id = %connection, request_id = %request_id, "skipping abandoned request");
            continue;
        }

        let result = tokio::select! {
            handled = tokio::time::timeout_at(deadline, worker.handle(payload)) => {
                handled.unwrap_or_else(|_| {
                    debug!(connection_id = %connection, request_id = %request_id, "request dropped at deadline");
                    Err(WorkerError::DeadlineElapsed)
                })
            }
            _ = reply.closed() => {
                trace!(connection_id = %connection, request_id = %request_id, "asker went away mid-request");
                continue;
            }
        };
        // The asker may have given up meanwhile.
        let _ = reply.send(result);
    }
    debug!(connection_id = %connection, "worker stopped");
}

/// Creates the worker for a newly accepted connection.
pub trait WorkerFactory: Send + Sync {
    fn spawn(&self, connection: ConnectionId) -> WorkerHandle;
}

/// Factory backed by a constructor closure.
pub struct FnWorkerFactory<F> {
    make: F,
    mailbox_capacity: usize,
}

impl<F, W> FnWorkerFactory<F>
where
    F: Fn(ConnectionId) -> W + Send + Sync,
    W: Worker,
{
    pub fn new(make: F, mailbox_capacity: usize) -> Self {
        Self {
            make,
            mailbox_capacity,
        }
    }
}

impl<F, W> WorkerFactory for FnWorkerFactory<F>
where
    F: Fn(ConnectionId) -> W + Send + Sync,
    W: Worker,
{
    fn spawn(&self, connection: ConnectionId) -> WorkerHandle {
        WorkerHandle::spawn((self.make)(connection), connection, self.mailbox_capacity)
    }
}
