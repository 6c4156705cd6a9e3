//! Frame model for the upgraded connection.
//!
//! `Frame` is the gateway's own view of a WebSocket message. It is converted
//! from the codec's `Message` on read and back into a `Message` on write, so
//! the dispatcher and broker never touch codec types.

use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::error::GatewayError;

/// Close code sent when a peer uses a frame type we do not accept.
pub const CLOSE_UNSUPPORTED_DATA: u16 = 1003;
/// Close code sent when a text payload exceeds the configured limit.
pub const CLOSE_MESSAGE_TOO_BIG: u16 = 1009;
/// Close code sent when a worker round trip fails under the close policy.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// A single protocol-level message unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text payload.
    Text(String),
    /// Ping with opaque payload.
    Ping(Vec<u8>),
    /// Pong with opaque payload.
    Pong(Vec<u8>),
    /// Close, optionally carrying a status code and reason.
    Close { code: Option<u16>, reason: String },
    /// Any frame type the gateway does not handle, by name.
    Unsupported(String),
}

impl Frame {
    /// Build a close frame with a status code.
    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Frame::Close {
            code: Some(code),
            reason: reason.into(),
        }
    }

    /// Frame type name, used in logs and metric labels.
    pub fn kind(&self) -> &str {
        match self {
            Frame::Text(_) => "text",
            Frame::Ping(_) => "ping",
            Frame::Pong(_) => "pong",
            Frame::Close { .. } => "close",
            Frame::Unsupported(name) => name,
        }
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Frame::Close { .. })
    }
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Frame::Text(text.as_str().to_owned()),
            Message::Ping(payload) => Frame::Ping(payload.to_vec()),
            Message::Pong(payload) => Frame::Pong(payload.to_vec()),
            Message::Close(Some(close)) => Frame::Close {
                code: Some(u16::from(close.code)),
                reason: close.reason.as_str().to_owned(),
            },
            Message::Close(None) => Frame::Close {
                code: None,
                reason: String::new(),
            },
            Message::Binary(_) => Frame::Unsupported("binary".to_string()),
            Message::Frame(_) => Frame::Unsupported("raw".to_string()),
        }
    }
}

impl TryFrom<Frame> for Message {
    type Error = GatewayError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        Ok(match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Ping(payload) => Message::Ping(payload.into()),
            Frame::Pong(payload) => Message::Pong(payload.into()),
            Frame::Close { code: None, .. } => Message::Close(None),
            Frame::Close {
                code: Some(code),
                reason,
            } => Message::Close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: reason.into(),
            })),
            Frame::Unsupported(name) => return Err(GatewayError::UnsupportedFrameType(name)),
        })
    }
}
