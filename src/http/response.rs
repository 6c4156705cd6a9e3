//! Response descriptors and the rules for writing them.
//!
//! # Responsibilities
//! - Describe a response (status, headers, body) independent of the codec
//! - Apply the error-body rule: non-200 bodies carry the status line text
//! - Decide whether the connection closes after the response
//!
//! # Design Decisions
//! - `101 Switching Protocols` bypasses both rules; its connection is handed
//!   to the frame codec instead of being closed

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::{Response, StatusCode};

use crate::error::GatewayError;

/// Content type of the index page.
pub const TEXT_HTML_UTF8: &str = "text/html; charset=UTF-8";

/// A response the gateway intends to send.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl HttpResponse {
    /// Empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// 200 response carrying an HTML document.
    pub fn html(body: Bytes) -> Self {
        Self::new(StatusCode::OK)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_HTML_UTF8))
            .with_body(body)
    }

    /// Response matching a connection-level error raised before the upgrade.
    pub fn for_error(err: &GatewayError) -> Self {
        let status = match err {
            GatewayError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::UnsupportedProtocolVersion(_) => StatusCode::UPGRADE_REQUIRED,
            GatewayError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Whether writing this response ends the connection.
    pub fn closes_connection(&self, keep_alive: bool) -> bool {
        if self.status == StatusCode::SWITCHING_PROTOCOLS {
            return false;
        }
        !keep_alive || self.status != StatusCode::OK
    }

    /// Convert into a hyper response, applying body and connection rules.
    pub fn into_response(mut self, keep_alive: bool) -> Response<Full<Bytes>> {
        let closes = self.closes_connection(keep_alive);

        if self.status != StatusCode::OK && self.status != StatusCode::SWITCHING_PROTOCOLS {
            self.body = Bytes::from(status_line(self.status));
        }
        if self.status != StatusCode::SWITCHING_PROTOCOLS {
            self.headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        }
        if closes {
            self.headers
                .insert(header::CONNECTION, HeaderValue::from_static("close"));
        }

        let mut response = Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Status line text, e.g. `404 Not Found`.
pub fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}
