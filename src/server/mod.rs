//! Event stream server
//!
//! [`HubServer`] owns the accept loop and serves one hub on one path over
//! hyper's HTTP/1 connection driver. Applications with their own HTTP stack skip
//! the server and call [`Hub::handle`](crate::Hub::handle) with their own
//! [`StreamRequest`] / [`StreamResponse`] implementations.

pub mod config;
pub mod handler;
pub mod http;
pub mod listener;
pub mod page;

pub use config::ServerConfig;
pub use handler::{StreamRequest, StreamResponse};
pub use http::{FrameBody, HttpRequest, HttpResponse};
pub use listener::HubServer;
