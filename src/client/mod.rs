//! Event stream client
//!
//! Provides the receiving side of a hub stream:
//! - Connecting to any `text/event-stream` endpoint
//! - Re-exposing its `data:` lines as a pollable or push-based sequence

pub mod config;
pub mod receiver;
mod scanner;
pub mod state;

pub use config::ClientConfig;
pub use receiver::StreamClient;
pub use state::ClientState;
