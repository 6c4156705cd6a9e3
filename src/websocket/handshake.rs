//! WebSocket opening handshake (RFC 6455, section 4.2).
//!
//! The negotiator only decides; it never touches the transport. An
//! `Accepted` result carries the `101` response, and the caller is expected
//! to move the connection to `Upgraded` before that response is written.

use hyper::header::{self, HeaderValue};
use hyper::{StatusCode, Version};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

use crate::error::GatewayError;
use crate::http::request::HttpRequestEnvelope;
use crate::http::response::HttpResponse;

/// The only protocol version the gateway speaks.
pub const SUPPORTED_VERSION: &str = "13";

/// Outcome of a handshake attempt.
#[derive(Debug)]
pub enum HandshakeResult {
    /// Upgrade confirmed; send this `101` response and switch to frames.
    Accepted(HttpResponse),
    /// Upgrade refused; send this response and close.
    Rejected {
        response: HttpResponse,
        reason: GatewayError,
    },
}

impl HandshakeResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, HandshakeResult::Accepted(_))
    }
}

/// Negotiate an upgrade for a request already routed to the WebSocket path.
pub fn negotiate(request: &HttpRequestEnvelope) -> HandshakeResult {
    // HTTP/1.0 has no upgrade mechanism.
    if request.version() != Version::HTTP_11 {
        return rejected(
            StatusCode::BAD_REQUEST,
            GatewayError::MalformedRequest(format!(
                "upgrade requires HTTP/1.1, got {:?}",
                request.version()
            )),
        );
    }

    match request.header(header::SEC_WEBSOCKET_VERSION).map(str::trim) {
        Some(SUPPORTED_VERSION) => {}
        other => {
            let version = other.unwrap_or("missing").to_string();
            return rejected(
                StatusCode::UPGRADE_REQUIRED,
                GatewayError::UnsupportedProtocolVersion(version),
            );
        }
    }

    if !request.has_header_token(header::UPGRADE, "websocket") {
        return rejected(
            StatusCode::BAD_REQUEST,
            GatewayError::MalformedRequest("missing 'Upgrade: websocket' header".into()),
        );
    }

    let key = match request.header(header::SEC_WEBSOCKET_KEY).map(str::trim) {
        Some(key) if is_valid_key(key) => key,
        Some(_) => {
            return rejected(
                StatusCode::BAD_REQUEST,
                GatewayError::MalformedRequest("invalid Sec-WebSocket-Key".into()),
            )
        }
        None => {
            return rejected(
                StatusCode::BAD_REQUEST,
                GatewayError::MalformedRequest("missing Sec-WebSocket-Key".into()),
            )
        }
    };

    let accept = derive_accept_key(key.as_bytes());
    let accept = match HeaderValue::from_str(&accept) {
        Ok(value) => value,
        Err(e) => {
            return rejected(
                StatusCode::BAD_REQUEST,
                GatewayError::MalformedRequest(e.to_string()),
            )
        }
    };

    HandshakeResult::Accepted(
        HttpResponse::new(StatusCode::SWITCHING_PROTOCOLS)
            .with_header(header::UPGRADE, HeaderValue::from_static("websocket"))
            .with_header(header::CONNECTION, HeaderValue::from_static("Upgrade"))
            .with_header(header::SEC_WEBSOCKET_ACCEPT, accept),
    )
}

fn rejected(status: StatusCode, reason: GatewayError) -> HandshakeResult {
    HandshakeResult::Rejected {
        response: HttpResponse::new(status)
            .with_header(header::SEC_WEBSOCKET_VERSION, HeaderValue::from_static(SUPPORTED_VERSION)),
        reason,
    }
}

/// A key is the base64 encoding of a 16-byte nonce: 22 symbols plus `==`.
fn is_valid_key(key: &str) -> bool {
    let bytes = key.as_bytes();
    bytes.len() == 24
        && bytes.ends_with(b"==")
        && bytes[..22]
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || *b == b'+' || *b == b'/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::body::Bytes;
    use hyper::Request;

    const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

    fn upgrade_request(version: Option<&str>, key: Option<&str>) -> HttpRequestEnvelope {
        let mut builder = Request::get("/websocket")
            .header("Host", "server.example.com")
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade");
        if let Some(version) = version {
            builder = builder.header("Sec-WebSocket-Version", version);
        }
        if let Some(key) = key {
            builder = builder.header("Sec-WebSocket-Key", key);
        }
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        HttpRequestEnvelope::from_parts(&parts, Bytes::new())
    }

    #[test]
    fn accepts_rfc_sample() {
        match negotiate(&upgrade_request(Some("13"), Some(SAMPLE_KEY))) {
            HandshakeResult::Accepted(response) => {
                assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
                assert_eq!(
                    response.headers()[header::SEC_WEBSOCKET_ACCEPT],
                    "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
                );
                assert_eq!(response.headers()[header::UPGRADE], "websocket");
            }
            other => panic!("expected Accepted, got {:?}", other),
        }
    }

    #[test]
    fn old_version_gets_426_with_supported_version() {
        match negotiate(&upgrade_request(Some("8"), Some(SAMPLE_KEY))) {
            HandshakeResult::Rejected { response, reason } => {
                assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
                assert_eq!(response.headers()[header::SEC_WEBSOCKET_VERSION], "13");
                assert!(matches!(reason, GatewayError::UnsupportedProtocolVersion(v) if v == "8"));
            }
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[test]
    fn missing_version_is_unsupported() {
        let result = negotiate(&upgrade_request(None, Some(SAMPLE_KEY)));
        assert!(matches!(
            result,
            HandshakeResult::Rejected {
                reason: GatewayError::UnsupportedProtocolVersion(_),
                ..
            }
        ));
    }

    #[test]
    fn bad_key_is_malformed_but_still_advertises_version() {
        for key in [None, Some("short"), Some("!!!!!!!!!!!!!!!!!!!!!!==")] {
            match negotiate(&upgrade_request(Some("13"), key)) {
                HandshakeResult::Rejected { response, reason } => {
                    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
                    assert_eq!(response.headers()[header::SEC_WEBSOCKET_VERSION], "13");
                    assert!(matches!(reason, GatewayError::MalformedRequest(_)));
                }
                other => panic!("expected Rejected for {:?}, got {:?}", key, other),
            }
        }
    }

    #[test]
    fn missing_upgrade_header_rejected() {
        let (parts, ()) = Request::get("/websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", SAMPLE_KEY)
            .body(())
            .unwrap()
            .into_parts();
        let request = HttpRequestEnvelope::from_parts(&parts, Bytes::new());
        assert!(!negotiate(&request).is_accepted());
    }

    #[test]
    fn http10_upgrade_is_bad_request() {
        let (parts, ()) = Request::get("/websocket")
            .version(Version::HTTP_10)
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", SAMPLE_KEY)
            .body(())
            .unwrap()
            .into_parts();
        let request = HttpRequestEnvelope::from_parts(&parts, Bytes::new());
        match negotiate(&request) {
            HandshakeResult::Rejected { response, reason } => {
                assert_eq!(response.status(), StatusCode::BAD_REQUEST);
                assert!(matches!(reason, GatewayError::MalformedRequest(m) if m.contains("HTTP/1.1")));
            }
            other => panic!("expected Rejected, got {:?}", other),
        }
    }
}
