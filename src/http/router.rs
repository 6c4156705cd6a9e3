//! Request routing ahead of the handshake.
//!
//! ```text
//! non-GET                          → 403
//! GET /                            → index page
//! GET /favicon.ico                 → 404 (before any upgrade check)
//! GET <ws path> + Connection: Upgrade → handshake negotiation
//! anything else                    → 404
//! ```

use hyper::Method;

use crate::http::request::HttpRequestEnvelope;

pub const ROOT_PATH: &str = "/";
pub const FAVICON_PATH: &str = "/favicon.ico";

/// Where a parsed request goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Forbidden,
    IndexPage,
    NotFound,
    Upgrade,
}

/// Route a request given the configured WebSocket path.
pub fn route(request: &HttpRequestEnvelope, websocket_path: &str) -> Route {
    if *request.method() != Method::GET {
        return Route::Forbidden;
    }
    match request.path() {
        ROOT_PATH => Route::IndexPage,
        FAVICON_PATH => Route::NotFound,
        path if path == websocket_path && request.is_upgrade_request() => Route::Upgrade,
        _ => Route::NotFound,
    }
}
