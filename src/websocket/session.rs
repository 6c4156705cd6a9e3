//! Upgraded connection loop.
//!
//! # Responsibilities
//! - Own the WebSocket stream: the only place that reads or writes frames
//! - Read one frame, dispatch it fully, then read the next
//! - Drain the outbox (worker replies, error envelopes, policy closes)
//! - Map fatal errors to close codes and leave the connection `Closed`
//!
//! # Design Decisions
//! - Ping replies are written before the next read, which supersedes the
//!   codec's own queued pong, so the peer sees exactly one pong per ping
//! - A peer close is acknowledged by the codec's own queued echo, never by
//!   a second close frame
//! - Shutdown sends close 1001 (going away)

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use crate::error::{GatewayError, Result};
use crate::net::connection::Connection;
use crate::websocket::dispatcher::{Dispatch, FrameDispatcher};
use crate::websocket::frame::{
    Frame, CLOSE_INTERNAL_ERROR, CLOSE_MESSAGE_TOO_BIG, CLOSE_UNSUPPORTED_DATA,
};

/// Close code sent to peers when the server stops.
pub const CLOSE_GOING_AWAY: u16 = 1001;

pub struct Session<S> {
    connection: Arc<Connection>,
    stream: WebSocketStream<S>,
    outbox: mpsc::Receiver<Frame>,
    dispatcher: Arc<FrameDispatcher>,
    shutdown: broadcast::Receiver<()>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        connection: Arc<Connection>,
        stream: WebSocketStream<S>,
        outbox: mpsc::Receiver<Frame>,
        dispatcher: Arc<FrameDispatcher>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            connection,
            stream,
            outbox,
            dispatcher,
            shutdown,
        }
    }

    /// Run until the peer closes, an error occurs, or shutdown is signalled.
    pub async fn run(self) -> Result<()> {
        let Session {
            connection,
            mut stream,
            mut outbox,
            dispatcher,
            mut shutdown,
        } = self;

        let result = loop {
            tokio::select! {
                incoming = stream.next() => {
                    let message = match incoming {
                        Some(Ok(message)) => message,
                        Some(Err(err)) => break Err(err.into()),
                        None => break Ok(()),
                    };
                    match dispatcher.dispatch(&connection, Frame::from(message)) {
                        Ok(Dispatch::Reply(frame)) => {
                            if let Err(err) = send(&mut stream, frame).await {
                                break Err(err);
                            }
                        }
                        Ok(Dispatch::Submitted) | Ok(Dispatch::Ignored) => {}
                        // The codec queued the echo when it read the peer's close;
                        // closing the sink flushes it.
                        Ok(Dispatch::Close(frame)) => {
                            debug!(connection_id = %connection.id(), echo = ?frame, "Acknowledging close");
                            match stream.close(None).await {
                                Ok(()) => break Ok(()),
                                Err(err) => break Err(err.into()),
                            }
                        }
                        // Closed by the broker; its close frame is still queued.
                        Err(GatewayError::ConnectionClosed) => {
                            while let Ok(frame) = outbox.try_recv() {
                                if send(&mut stream, frame).await.is_err() {
                                    break;
                                }
                            }
                            break Ok(());
                        }
                        Err(err) => break Err(err),
                    }
                }
                outgoing = outbox.recv() => {
                    let Some(frame) = outgoing else { break Ok(()) };
                    let closing = frame.is_close();
                    if let Err(err) = send(&mut stream, frame).await {
                        break Err(err);
                    }
                    if closing {
                        break Ok(());
                    }
                }
                _ = shutdown.recv() => {
                    debug!(connection_id = %connection.id(), "Shutdown signalled, closing session");
                    let _ = send(&mut stream, Frame::close(CLOSE_GOING_AWAY, "server shutting down")).await;
                    break Ok(());
                }
            }
        };

        if let Err(err) = &result {
            match err {
                GatewayError::UnsupportedFrameType(_) => {
                    error!(connection_id = %connection.id(), error = %err, "Unsupported frame")
                }
                GatewayError::Transport(_) => {
                    debug!(connection_id = %connection.id(), error = %err, "Transport error")
                }
                _ => warn!(connection_id = %connection.id(), error = %err, "Session failed"),
            }
            if let Some((code, reason)) = close_code_for(err) {
                let _ = send(&mut stream, Frame::close(code, reason)).await;
            }
        }

        connection.close();
        info!(connection_id = %connection.id(), "Web socket closed");
        result
    }
}

/// Close code to send for a fatal session error, if the transport still works.
pub fn close_code_for(err: &GatewayError) -> Option<(u16, &'static str)> {
    match err {
        GatewayError::UnsupportedFrameType(_) => {
            Some((CLOSE_UNSUPPORTED_DATA, "unsupported frame type"))
        }
        GatewayError::MessageTooLarge(..) => Some((CLOSE_MESSAGE_TOO_BIG, "message too big")),
        GatewayError::Transport(inner) => match inner.as_ref() {
            tungstenite::Error::Capacity(_) => Some((CLOSE_MESSAGE_TOO_BIG, "message too big")),
            _ => None,
        },
        GatewayError::Http(_) | GatewayError::Io(_) => None,
        _ => Some((CLOSE_INTERNAL_ERROR, "internal error")),
    }
}

async fn send<S>(stream: &mut WebSocketStream<S>, frame: Frame) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let message = Message::try_from(frame)?;
    stream.send(message).await?;
    Ok(())
}
