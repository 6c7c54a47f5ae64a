//! Minimal hub server that publishes a counter every second
//!
//! Run with: cargo run --example simple [BIND_ADDR]
//!
//! Then open http://localhost:8080/ in a browser, or:
//!   curl -N -H 'Accept: text/event-stream' http://localhost:8080/

use std::net::SocketAddr;
use std::time::Duration;

use ssehub::{Hub, HubConfig, HubServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bind_addr: SocketAddr = match std::env::args().nth(1) {
        Some(addr) => addr.parse()?,
        None => SocketAddr::from(([0, 0, 0, 0], 8080)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ssehub=debug".parse()?)
                .add_directive("simple=debug".parse()?),
        )
        .init();

    let hub = Hub::new(HubConfig::default());
    let server = HubServer::new(ServerConfig::with_addr(bind_addr), hub.clone());

    let publisher = hub.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        let mut count = 0u64;

        while !publisher.is_closed() {
            ticker.tick().await;
            count += 1;
            publisher.send(format!("tick {}", count)).await;
        }
    });

    println!("Streaming on http://{}/ (Ctrl+C to stop)", bind_addr);

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    let stats = hub.stats();
    println!(
        "Sent {} messages, evicted {} subscribers",
        stats.broadcast, stats.evicted
    );

    Ok(())
}
