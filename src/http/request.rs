//! Parsed HTTP request envelope.
//!
//! # Responsibilities
//! - Aggregate the request body up to the configured bound
//! - Capture method, path, version and headers in an immutable value
//! - Derive the keep-alive flag from version and `Connection` header
//!
//! # Design Decisions
//! - Header lookup is case-insensitive (`HeaderMap` semantics)
//! - The query string is not part of the routed path

use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{self, HeaderMap};
use hyper::http::request::Parts;
use hyper::{Method, Version};

use crate::error::{GatewayError, Result};

/// An HTTP request as seen by the gateway core.
#[derive(Debug, Clone)]
pub struct HttpRequestEnvelope {
    method: Method,
    path: String,
    version: Version,
    headers: HeaderMap,
    keep_alive: bool,
    body: Bytes,
}

impl HttpRequestEnvelope {
    /// Build an envelope from a request head and its aggregated body.
    pub fn from_parts(parts: &Parts, body: Bytes) -> Self {
        let keep_alive = is_keep_alive(parts.version, &parts.headers);
        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            version: parts.version,
            headers: parts.headers.clone(),
            keep_alive,
            body,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Whether the client asked to reuse the connection.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Header value as text, if present and visible ASCII.
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// `Host` header, used to build the advertised WebSocket location.
    pub fn host(&self) -> Option<&str> {
        self.header(header::HOST)
    }

    /// Whether a comma-separated header contains `token` (case-insensitive).
    pub fn has_header_token(&self, name: impl header::AsHeaderName, token: &str) -> bool {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| contains_token(v, token))
    }

    /// `Connection: Upgrade` is present.
    pub fn is_upgrade_request(&self) -> bool {
        self.has_header_token(header::CONNECTION, "upgrade")
    }
}

/// Read a request body into memory, refusing anything above `limit` bytes.
pub async fn collect_body<B>(body: B, limit: usize) -> Result<Bytes>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.is::<LengthLimitError>() => Err(GatewayError::BodyTooLarge(limit)),
        Err(err) => Err(GatewayError::MalformedRequest(err.to_string())),
    }
}

fn is_keep_alive(version: Version, headers: &HeaderMap) -> bool {
    let connection = |token: &str| {
        headers
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| contains_token(v, token))
    };
    match version {
        Version::HTTP_09 | Version::HTTP_10 => connection("keep-alive"),
        _ => !connection("close"),
    }
}

fn contains_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}
