//! Connection state machine and lifecycle tracking.
//!
//! # Responsibilities
//! - Track connection state (AwaitingRequest → Upgraded | Rejected → Closed)
//! - Generate unique connection IDs for tracing
//! - Own the connection's worker handle and, once upgraded, its outbox
//! - Count live connections for graceful shutdown
//!
//! # Design Decisions
//! - Transitions are applied under the connection's lock, one at a time
//! - State is published through a watch channel so pending work can wait
//!   for `Closed` without polling
//! - Closing drops the worker handle and the outbox sender; the socket itself
//!   belongs to the session loop

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::error::{GatewayError, Result};
use crate::observability::metrics;
use crate::websocket::frame::Frame;
use crate::worker::{WorkerFactory, WorkerHandle};

/// Global atomic counter for connection IDs.
/// Relaxed ordering is enough: only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Where a connection is in its protocol lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Speaking HTTP, waiting for the next request.
    AwaitingRequest,
    /// Handshake accepted; frames are exchanged.
    Upgraded,
    /// An HTTP exchange failed; the connection is about to close.
    Rejected,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (AwaitingRequest, Upgraded)
                | (AwaitingRequest, Rejected)
                | (AwaitingRequest, Closed)
                | (Upgraded, Closed)
                | (Rejected, Closed)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::AwaitingRequest => "awaiting_request",
            ConnectionState::Upgraded => "upgraded",
            ConnectionState::Rejected => "rejected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
struct Resources {
    worker: Option<WorkerHandle>,
    outbox: Option<mpsc::Sender<Frame>>,
}

/// One accepted client connection.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    state: watch::Sender<ConnectionState>,
    resources: Mutex<Resources>,
}

impl Connection {
    /// Create a connection in `AwaitingRequest` and spawn its worker.
    pub fn new(peer_addr: SocketAddr, workers: &dyn WorkerFactory) -> Arc<Self> {
        let id = ConnectionId::new();
        let (state, _) = watch::channel(ConnectionState::AwaitingRequest);
        Arc::new(Self {
            id,
            peer_addr,
            state,
            resources: Mutex::new(Resources {
                worker: Some(workers.spawn(id)),
                outbox: None,
            }),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Handshake accepted: switch to frames and install the outbox.
    pub fn upgrade(&self, outbox: mpsc::Sender<Frame>) -> Result<()> {
        let mut resources = self.resources.lock();
        self.transition(ConnectionState::Upgraded)?;
        resources.outbox = Some(outbox);
        Ok(())
    }

    /// The HTTP exchange ended in an error response.
    pub fn reject(&self) -> Result<()> {
        let _resources = self.resources.lock();
        self.transition(ConnectionState::Rejected)
    }

    /// Enter `Closed`, releasing the worker and the outbox.
    ///
    /// Returns `false` if the connection was already closed.
    pub fn close(&self) -> bool {
        let mut resources = self.resources.lock();
        if self.transition(ConnectionState::Closed).is_err() {
            return false;
        }
        resources.worker = None;
        resources.outbox = None;
        tracing::debug!(connection_id = %self.id, "Connection state closed");
        true
    }

    /// Resolves once the connection is closed (or dropped).
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut state = self.state.subscribe();
        async move {
            let _ = state.wait_for(|s| *s == ConnectionState::Closed).await;
        }
    }

    /// The connection's worker, until it closes.
    pub fn worker(&self) -> Option<WorkerHandle> {
        self.resources.lock().worker.clone()
    }

    /// Queue a frame for the session loop. No-op once closed.
    pub async fn deliver(&self, frame: Frame) -> bool {
        let outbox = match self.resources.lock().outbox.clone() {
            Some(outbox) => outbox,
            None => return false,
        };
        outbox.send(frame).await.is_ok()
    }

    /// Callers hold the resources lock.
    fn transition(&self, next: ConnectionState) -> Result<()> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                outcome = Err(GatewayError::InvalidTransition {
                    from: *current,
                    to: next,
                });
                false
            }
        });
        outcome
    }
}

/// Tracks active connections for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self, id: ConnectionId) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        metrics::record_connection_opened();
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id,
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until every tracked connection has finished.
    pub async fn wait_for_shutdown(&self) {
        while self.active_count() > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        metrics::record_connection_closed();
        tracing::trace!(connection_id = %self.id, "Connection released");
    }
}
