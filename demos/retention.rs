//! Late joiners get recent history
//!
//! Publishes five messages into a hub that retains three, then connects a
//! receiver which gets the last three replayed before any live message.
//!
//! Run with: cargo run --example retention

use std::net::SocketAddr;

use ssehub::{ClientConfig, Hub, HubConfig, HubServer, ServerConfig, StreamClient};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ssehub=debug".parse()?),
        )
        .init();

    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let url = format!("http://{}/", listener.local_addr()?);

    let hub = Hub::new(HubConfig::default().retention(3));
    let server = HubServer::new(ServerConfig::default(), hub.clone());
    let server_task = tokio::spawn(async move { server.serve(listener).await });

    for i in 1..=5 {
        hub.send(format!("history {}", i)).await;
    }

    // Let the broadcaster drain the queue
    while hub.stats().broadcast < 5 {
        tokio::task::yield_now().await;
    }

    let mut client = StreamClient::new(url, ClientConfig::default().buffer_size(10));
    client.connect().await?;

    hub.send("live").await;

    for _ in 0..4 {
        match client.next_line().await {
            Some(line) => println!("{}", line),
            None => break,
        }
    }

    client.shutdown();
    hub.shutdown().await;
    server_task.abort();

    Ok(())
}
