//! Many concurrent connections, each with its own worker.

use std::time::{Duration, Instant};

use futures_util::SinkExt;
use tokio_tungstenite::tungstenite::Message;
use ws_gateway::GatewayServer;

mod common;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_connections_get_their_own_replies() {
    let (addr, _shutdown) =
        common::spawn_gateway(GatewayServer::new(common::test_config())).await;

    let concurrency = 50;
    let messages_per_connection = 10;
    let start = Instant::now();

    let mut tasks = Vec::with_capacity(concurrency);
    for n in 0..concurrency {
        tasks.push(tokio::spawn(async move {
            let mut client = common::connect(addr).await;
            for m in 0..messages_per_connection {
                let payload = format!("client {} message {}", n, m);
                client.send(Message::Text(payload.clone().into())).await.unwrap();
                assert_eq!(
                    common::next_message(&mut client).await,
                    Message::Text(payload.to_uppercase().into())
                );
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let elapsed = start.elapsed();
    println!(
        "{} round trips over {} connections in {:?}",
        concurrency * messages_per_connection,
        concurrency,
        elapsed
    );
    assert!(elapsed < Duration::from_secs(30));
}

#[tokio::test]
async fn connection_limit_holds_back_extra_clients() {
    let mut config = common::test_config();
    config.listener.max_connections = 1;
    let (addr, _shutdown) = common::spawn_gateway(GatewayServer::new(config)).await;

    let mut first = common::connect(addr).await;
    let second = tokio::time::timeout(
        Duration::from_millis(300),
        tokio_tungstenite::connect_async(format!("ws://{}/websocket", addr)),
    )
    .await;
    assert!(second.is_err(), "second client should wait for a free slot");

    first.send(Message::Text("ok".into())).await.unwrap();
    assert_eq!(common::next_message(&mut first).await, Message::Text("OK".into()));
}
