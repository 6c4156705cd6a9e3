//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper http1 connection, upgrades enabled)
//!     → request.rs (aggregate body, envelope, keep-alive)
//!     → router.rs (403 / page / 404 / upgrade)
//!     → page.rs (index page) or websocket::handshake
//!     → response.rs (status-line bodies, connection close rule)
//!     → Send to client
//! ```

pub mod page;
pub mod request;
pub mod response;
pub mod router;
pub mod server;

pub use page::{DefaultIndexPage, IndexPage};
pub use server::GatewayServer;
