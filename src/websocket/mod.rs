//! WebSocket protocol subsystem.
//!
//! # Data Flow
//! ```text
//! routed upgrade request
//!     → handshake.rs (negotiate: 101 or a rejection response)
//!     → session.rs (owns the upgraded stream)
//!         → frame.rs (codec message ⇄ Frame)
//!         → dispatcher.rs (close / ping / pong / text / unsupported)
//!         → broker (text round trips, replies via the outbox)
//! ```

pub mod dispatcher;
pub mod frame;
pub mod handshake;
pub mod session;

pub use dispatcher::{Dispatch, FrameDispatcher};
pub use frame::Frame;
pub use handshake::{negotiate, HandshakeResult};
pub use session::Session;
