//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use ws_gateway::config::GatewayConfig;
use ws_gateway::lifecycle::Shutdown;
use ws_gateway::net::listener::Listener;
use ws_gateway::GatewayServer;

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Sample nonce from RFC 6455 section 1.3.
pub const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

/// Default configuration bound to an ephemeral loopback port.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.lifecycle.shutdown_grace_secs = 1;
    config
}

/// Start `server` in the background. Keep the returned `Shutdown` alive for
/// the duration of the test; dropping it stops the server.
pub async fn spawn_gateway(server: GatewayServer) -> (SocketAddr, Shutdown) {
    let listener = Listener::bind(&server.config().listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });
    (addr, shutdown)
}

/// Open a WebSocket client on the default path.
pub async fn connect(addr: SocketAddr) -> Client {
    let (client, response) = tokio_tungstenite::connect_async(format!("ws://{}/websocket", addr))
        .await
        .unwrap();
    assert_eq!(response.status(), 101);
    client
}

/// Next frame from the server, failing the test after a few seconds.
pub async fn next_message(client: &mut Client) -> Message {
    use futures_util::StreamExt;
    tokio::time::timeout(std::time::Duration::from_secs(5), client.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("stream ended")
        .expect("transport error")
}

pub fn close_code(message: &Message) -> Option<u16> {
    match message {
        Message::Close(Some(frame)) => Some(u16::from(frame.code)),
        _ => None,
    }
}

/// Send raw bytes and read until the server closes the connection.
pub async fn raw_exchange(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        stream.read_to_end(&mut response),
    )
    .await
    .expect("server did not close the connection")
    .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

/// Send raw bytes and read only the response head.
pub async fn raw_head(addr: SocketAddr, request: &str) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        assert!(n > 0, "connection closed before end of head");
        head.push(byte[0]);
    }
    (stream, String::from_utf8_lossy(&head).into_owned())
}

/// Upgrade request for the default path with the given version and key.
pub fn upgrade_request(version: &str, key: Option<&str>) -> String {
    let mut request = format!(
        "GET /websocket HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Version: {}\r\n",
        version
    );
    if let Some(key) = key {
        request.push_str(&format!("Sec-WebSocket-Key: {}\r\n", key));
    }
    request.push_str("\r\n");
    request
}
