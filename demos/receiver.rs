//! Print the lines of a remote event stream
//!
//! Run with: cargo run --example receiver [URL]
//!
//! Defaults to http://localhost:8080/, so it pairs with the `simple` demo.

use std::time::Duration;

use ssehub::{CancellationToken, ClientConfig, StreamClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:8080/".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ssehub=info".parse()?),
        )
        .init();

    let stop = CancellationToken::new();
    let config = ClientConfig::default()
        .buffer_size(100)
        .connect_timeout(Duration::from_secs(5));
    let mut client = StreamClient::with_cancellation(url, config, &stop);

    // Push side: mirror every line to stderr
    client.set_output(std::io::stderr());

    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        stop.cancel();
    });

    client.connect().await?;

    // Pull side
    let mut received = 0u64;
    while let Some(line) = client.next_line().await {
        received += 1;
        println!("#{} {}", received, line);
    }

    println!("Stream ended after {} lines", received);
    Ok(())
}
