//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → metrics exporter → bind listener → serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop accepting → sessions sent close 1001
//!     → drain within grace period → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
