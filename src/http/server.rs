//! Accept loop and per-connection HTTP serving.
//!
//! # Responsibilities
//! - Accept connections from the bounded listener until shutdown
//! - Create one `Connection` (and its worker) per accepted stream
//! - Serve HTTP/1.1 on the stream with upgrades enabled
//! - Route, negotiate the handshake, and write the response
//! - After a `101`, take the upgraded IO in the same task and run the session
//! - Drain open connections within the shutdown grace period
//!
//! # Data Flow
//! ```text
//! Listener::accept
//!     → Connection::new (AwaitingRequest, worker spawned)
//!     → hyper http1 connection (TraceLayer → handle_request)
//!         → router → page | 403 | 404 | handshake
//!         → on 101: Connection::upgrade + OnUpgrade parked in the slot
//!     → connection future returns → OnUpgrade resolves
//!     → websocket::Session::run → Connection::close
//! ```

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::upgrade::OnUpgrade;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::broker::RequestBroker;
use crate::config::GatewayConfig;
use crate::http::page::{websocket_location, DefaultIndexPage, IndexPage};
use crate::http::request::{collect_body, HttpRequestEnvelope};
use crate::http::response::HttpResponse;
use crate::http::router::{route, Route};
use crate::net::connection::{Connection, ConnectionTracker};
use crate::net::listener::{Listener, ListenerError};
use crate::observability::metrics;
use crate::websocket::dispatcher::FrameDispatcher;
use crate::websocket::frame::Frame;
use crate::websocket::handshake::{negotiate, HandshakeResult};
use crate::websocket::session::Session;
use crate::worker::{FnWorkerFactory, UppercaseWorker, WorkerFactory};

/// Handed from the request handler to the connection task after a `101`.
struct PendingUpgrade {
    on_upgrade: OnUpgrade,
    outbox: mpsc::Receiver<Frame>,
}

type UpgradeSlot = Arc<Mutex<Option<PendingUpgrade>>>;

/// State shared by every connection task.
struct Shared {
    config: Arc<GatewayConfig>,
    workers: Arc<dyn WorkerFactory>,
    page: Arc<dyn IndexPage>,
    dispatcher: Arc<FrameDispatcher>,
}

/// The WebSocket gateway server.
pub struct GatewayServer {
    config: Arc<GatewayConfig>,
    workers: Arc<dyn WorkerFactory>,
    page: Arc<dyn IndexPage>,
    tracker: ConnectionTracker,
}

impl GatewayServer {
    /// Server with the uppercase worker and the default index page.
    pub fn new(config: GatewayConfig) -> Self {
        let workers = FnWorkerFactory::new(|_| UppercaseWorker, config.broker.mailbox_capacity);
        Self {
            config: Arc::new(config),
            workers: Arc::new(workers),
            page: Arc::new(DefaultIndexPage),
            tracker: ConnectionTracker::new(),
        }
    }

    pub fn with_worker_factory(mut self, workers: impl WorkerFactory + 'static) -> Self {
        self.workers = Arc::new(workers);
        self
    }

    pub fn with_index_page(mut self, page: impl IndexPage + 'static) -> Self {
        self.page = Arc::new(page);
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Accept and serve connections until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let addr = listener.local_addr().map_err(ListenerError::Bind)?;
        info!(address = %addr, websocket_path = %self.config.websocket.path, "Gateway server starting");

        let broker = Arc::new(RequestBroker::new(&self.config.broker));
        let shared = Arc::new(Shared {
            config: Arc::clone(&self.config),
            workers: Arc::clone(&self.workers),
            page: Arc::clone(&self.page),
            dispatcher: Arc::new(FrameDispatcher::new(
                broker,
                self.config.websocket.max_message_size,
            )),
        });

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer_addr, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(ListenerError::LimiterClosed) => return Err(ListenerError::LimiterClosed),
                        Err(err) => {
                            warn!(error = %err, "Accept failed");
                            // Usually fd exhaustion; give in-flight connections a moment.
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            continue;
                        }
                    };

                    let connection = Connection::new(peer_addr, shared.workers.as_ref());
                    let guard = self.tracker.track(connection.id());
                    let span = info_span!("connection", connection_id = %connection.id(), peer_addr = %peer_addr);
                    let shared = Arc::clone(&shared);
                    let shutdown = shutdown.resubscribe();

                    tokio::spawn(
                        async move {
                            let _permit = permit;
                            let _guard = guard;
                            serve_connection(stream, connection, shared, shutdown).await;
                        }
                        .instrument(span),
                    );
                }
                _ = shutdown.recv() => {
                    info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }
        drop(listener);

        let grace = Duration::from_secs(self.config.lifecycle.shutdown_grace_secs);
        if tokio::time::timeout(grace, self.tracker.wait_for_shutdown())
            .await
            .is_err()
        {
            warn!(
                remaining = self.tracker.active_count(),
                grace_secs = grace.as_secs(),
                "Grace period elapsed with connections still open"
            );
        }

        info!("Gateway server stopped");
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    connection: Arc<Connection>,
    shared: Arc<Shared>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let slot: UpgradeSlot = Arc::new(Mutex::new(None));

    let handler = {
        let connection = Arc::clone(&connection);
        let shared = Arc::clone(&shared);
        let slot = Arc::clone(&slot);
        tower::service_fn(move |request: Request<Incoming>| {
            let connection = Arc::clone(&connection);
            let shared = Arc::clone(&shared);
            let slot = Arc::clone(&slot);
            async move {
                Ok::<_, Infallible>(handle_request(request, &connection, &shared, &slot).await)
            }
        })
    };
    let service = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .service(handler);

    let conn = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), TowerToHyperService::new(service))
        .with_upgrades();
    tokio::pin!(conn);

    let served = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown.recv() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(err) = served {
        debug!(error = %err, "HTTP connection ended with error");
    }

    let pending = slot.lock().take();
    if let Some(PendingUpgrade { on_upgrade, outbox }) = pending {
        match on_upgrade.await {
            Ok(upgraded) => {
                let stream =
                    WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None)
                        .await;
                let session = Session::new(
                    Arc::clone(&connection),
                    stream,
                    outbox,
                    Arc::clone(&shared.dispatcher),
                    shutdown,
                );
                // Errors are logged by the session itself.
                let _ = session.run().await;
            }
            Err(err) => warn!(error = %err, "Upgrade failed after 101"),
        }
    }

    connection.close();
}

async fn handle_request(
    request: Request<Incoming>,
    connection: &Arc<Connection>,
    shared: &Shared,
    slot: &UpgradeSlot,
) -> Response<Full<Bytes>> {
    let (mut parts, body) = request.into_parts();
    let on_upgrade = parts.extensions.remove::<OnUpgrade>();

    let (response, keep_alive) = match collect_body(body, shared.config.http.max_body_size).await {
        Ok(body) => {
            let request = HttpRequestEnvelope::from_parts(&parts, body);
            debug!(
                method = %request.method(),
                version = ?request.version(),
                body_bytes = request.body().len(),
                "Request received"
            );
            let response = respond(&request, on_upgrade, connection, shared, slot);
            (response, request.keep_alive())
        }
        Err(err) => {
            warn!(error = %err, "Request body rejected");
            (HttpResponse::for_error(&err), false)
        }
    };

    let status = response.status();
    if status != StatusCode::OK && status != StatusCode::SWITCHING_PROTOCOLS {
        if let Err(err) = connection.reject() {
            debug!(error = %err, "Connection not rejectable");
        }
    }
    metrics::record_http_response(status.as_u16());
    debug!(status = status.as_u16(), path = %parts.uri.path(), "Response ready");
    response.into_response(keep_alive)
}

fn respond(
    request: &HttpRequestEnvelope,
    on_upgrade: Option<OnUpgrade>,
    connection: &Arc<Connection>,
    shared: &Shared,
    slot: &UpgradeSlot,
) -> HttpResponse {
    let websocket_path = shared.config.websocket.path.as_str();
    match route(request, websocket_path) {
        Route::Forbidden => HttpResponse::new(StatusCode::FORBIDDEN),
        Route::NotFound => HttpResponse::new(StatusCode::NOT_FOUND),
        Route::IndexPage => {
            let location = websocket_location(request.host(), websocket_path);
            HttpResponse::html(shared.page.render(&location))
        }
        Route::Upgrade => match negotiate(request) {
            HandshakeResult::Accepted(response) => {
                match accept_upgrade(on_upgrade, connection, shared, slot) {
                    Ok(()) => {
                        metrics::record_handshake("accepted");
                        info!("WebSocket handshake accepted");
                        response
                    }
                    Err(reason) => {
                        metrics::record_handshake("rejected");
                        warn!(reason = %reason, "WebSocket handshake could not complete");
                        HttpResponse::new(StatusCode::INTERNAL_SERVER_ERROR)
                    }
                }
            }
            HandshakeResult::Rejected { response, reason } => {
                metrics::record_handshake("rejected");
                warn!(error = %reason, status = response.status().as_u16(), "WebSocket handshake rejected");
                response
            }
        },
    }
}

/// Move the connection to `Upgraded` and park the upgrade for the connection task.
fn accept_upgrade(
    on_upgrade: Option<OnUpgrade>,
    connection: &Arc<Connection>,
    shared: &Shared,
    slot: &UpgradeSlot,
) -> Result<(), String> {
    let on_upgrade = on_upgrade.ok_or_else(|| "request is not upgradable".to_string())?;
    let (tx, rx) = mpsc::channel(shared.config.broker.outbox_capacity);
    connection.upgrade(tx).map_err(|err| err.to_string())?;
    *slot.lock() = Some(PendingUpgrade {
        on_upgrade,
        outbox: rx,
    });
    Ok(())
}
