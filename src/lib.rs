//! ssehub: text broadcast over server-sent events
//!
//! A [`Hub`] accepts text messages from any number of publishers and fans
//! them out to every connected subscriber as `text/event-stream` frames.
//! A [`StreamClient`] consumes such a stream on the other end and exposes
//! its lines for pulling, pushing into a writer, or broadcasting further.
//!
//! # Features
//!
//! - Single broadcaster per hub: every subscriber sees the same order
//! - Slow subscribers are evicted instead of stalling the others
//! - Optional retention so late joiners get recent history
//! - Periodic keep-alive frames on idle streams
//! - `std::io::Write` and `tracing` adapters that publish into a hub
//!
//! # Example
//!
//! ```no_run
//! use ssehub::{Hub, HubConfig, HubServer, ServerConfig};
//!
//! # async fn example() -> ssehub::Result<()> {
//! let hub = Hub::new(HubConfig::default().retention(50));
//! let server = HubServer::new(ServerConfig::default().path("/log"), hub.clone());
//!
//! tokio::spawn(async move {
//!     hub.send("hello").await;
//! });
//!
//! server.run_until(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! }).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod server;

pub use client::{ClientConfig, ClientState, StreamClient};
pub use error::{Error, Result};
pub use hub::{Hub, HubConfig, HubStats, HubWriter, Message, SubscriberHandle};
pub use server::{HubServer, ServerConfig, StreamRequest, StreamResponse};
pub use tokio_util::sync::CancellationToken;
