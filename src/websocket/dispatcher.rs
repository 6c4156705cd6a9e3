//! Frame classification for an upgraded connection.
//!
//! | Frame           | Action                                         |
//! |-----------------|------------------------------------------------|
//! | `Close`         | echo it, move the connection to `Closed`        |
//! | `Ping(p)`       | reply `Pong(p)` inline                          |
//! | `Pong`          | ignore                                          |
//! | `Text(p)`       | submit to the broker (oversized → error 1009)   |
//! | `Unsupported`   | error, caller closes with 1003                  |

use std::sync::Arc;

use tracing::debug;

use crate::broker::RequestBroker;
use crate::error::{GatewayError, Result};
use crate::net::connection::{Connection, ConnectionState};
use crate::observability::metrics;
use crate::websocket::frame::Frame;

/// What the session loop must do after a frame was dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Write this frame now, before reading the next one.
    Reply(Frame),
    /// Handed to the broker; the reply arrives through the outbox.
    Submitted,
    /// Nothing to do.
    Ignored,
    /// Write this close frame and end the session.
    Close(Frame),
}

pub struct FrameDispatcher {
    broker: Arc<RequestBroker>,
    max_message_size: usize,
}

impl FrameDispatcher {
    pub fn new(broker: Arc<RequestBroker>, max_message_size: usize) -> Self {
        Self {
            broker,
            max_message_size,
        }
    }

    pub fn dispatch(&self, connection: &Arc<Connection>, frame: Frame) -> Result<Dispatch> {
        if connection.state() != ConnectionState::Upgraded {
            return Err(GatewayError::ConnectionClosed);
        }
        metrics::record_frame(frame.kind());

        match frame {
            Frame::Close { code, reason } => {
                debug!(connection_id = %connection.id(), ?code, %reason, "Close frame received");
                connection.close();
                Ok(Dispatch::Close(Frame::Close { code, reason }))
            }
            Frame::Ping(payload) => Ok(Dispatch::Reply(Frame::Pong(payload))),
            Frame::Pong(_) => Ok(Dispatch::Ignored),
            Frame::Text(text) if text.len() > self.max_message_size => {
                Err(GatewayError::MessageTooLarge(text.len(), self.max_message_size))
            }
            Frame::Text(text) => {
                debug!(connection_id = %connection.id(), payload = %text, "received text frame");
                self.broker.submit(connection, text);
                Ok(Dispatch::Submitted)
            }
            Frame::Unsupported(name) => Err(GatewayError::UnsupportedFrameType(name)),
        }
    }
}
