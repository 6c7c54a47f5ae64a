//! Stream the process log to browsers
//!
//! Every `tracing` event is written both to stdout and into the hub, so
//! opening http://localhost:8080/log shows the live log.
//!
//! Run with: cargo run --example logger

use std::time::Duration;

use ssehub::{Hub, HubConfig, HubServer, ServerConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let hub = Hub::new(HubConfig::default().retention(100));

    // RUST_LOG=ssehub=debug also streams the hub's own events
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("logger=info".parse()?);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(hub.log_layer())
        .init();

    let server = HubServer::new(ServerConfig::default().path("/log"), hub.clone());

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(500));
        let mut request_id = 0u64;

        loop {
            ticker.tick().await;
            request_id += 1;

            if request_id % 7 == 0 {
                tracing::warn!(request_id, "slow request");
            } else {
                tracing::info!(request_id, "request served");
            }
        }
    });

    println!("Log stream on http://localhost:8080/log (Ctrl+C to stop)");

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
