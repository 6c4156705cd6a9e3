//! Worker timeouts and failures, resolved through the failure policy.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::SinkExt;
use tokio_tungstenite::tungstenite::Message;
use ws_gateway::config::FailurePolicy;
use ws_gateway::{FnWorkerFactory, GatewayServer, Worker, WorkerError};

mod common;

/// Answers only payloads that do not start with `slow`.
struct Sluggish;

#[async_trait]
impl Worker for Sluggish {
    async fn handle(&mut self, payload: String) -> Result<String, WorkerError> {
        if payload.starts_with("slow") {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if payload.starts_with("fail") {
            return Err(WorkerError::Failed("refusing payload".into()));
        }
        Ok(payload.to_uppercase())
    }
}

async fn gateway(policy: FailurePolicy) -> (std::net::SocketAddr, ws_gateway::Shutdown) {
    let mut config = common::test_config();
    config.broker.request_timeout_ms = 150;
    config.broker.failure_policy = policy;
    let server = GatewayServer::new(config).with_worker_factory(FnWorkerFactory::new(|_| Sluggish, 8));
    common::spawn_gateway(server).await
}

fn envelope(message: Message) -> serde_json::Value {
    match message {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected text, got {:?}", other),
    }
}

#[tokio::test]
async fn timeout_sends_error_envelope_and_stays_open() {
    let (addr, _shutdown) = gateway(FailurePolicy::ErrorFrame).await;
    let mut client = common::connect(addr).await;

    client.send(Message::Text("slow request".into())).await.unwrap();
    let body = envelope(common::next_message(&mut client).await);
    assert_eq!(body["error"], "worker_timeout");
    assert!(body["request_id"].as_str().is_some());
    assert!(body["message"].as_str().unwrap().contains("within"));

    // The stuck request no longer holds the worker.
    client.send(Message::Text("quick".into())).await.unwrap();
    assert_eq!(common::next_message(&mut client).await, Message::Text("QUICK".into()));
}

#[tokio::test]
async fn worker_failure_sends_error_envelope() {
    let (addr, _shutdown) = gateway(FailurePolicy::ErrorFrame).await;
    let mut client = common::connect(addr).await;

    client.send(Message::Text("fail please".into())).await.unwrap();
    let body = envelope(common::next_message(&mut client).await);
    assert_eq!(body["error"], "worker_failure");
    assert!(body["message"].as_str().unwrap().contains("refusing payload"));

    client.send(Message::Text("still here".into())).await.unwrap();
    assert_eq!(common::next_message(&mut client).await, Message::Text("STILL HERE".into()));
}

#[tokio::test]
async fn timeout_under_close_policy_closes_with_1011() {
    let (addr, _shutdown) = gateway(FailurePolicy::Close).await;
    let mut client = common::connect(addr).await;

    client.send(Message::Text("slow request".into())).await.unwrap();
    let reply = common::next_message(&mut client).await;
    assert_eq!(common::close_code(&reply), Some(1011));
}
