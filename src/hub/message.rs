//! Hub message type

use bytes::Bytes;

use crate::protocol::frame;

/// A text message published through the hub
///
/// Pings are the synthetic keep-alives emitted by the broadcaster. They reach
/// every subscriber but are never retained for replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    text: String,
    ping: bool,
}

impl Message {
    /// Create a content message
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ping: false,
        }
    }

    /// Create a keep-alive ping
    pub fn ping() -> Self {
        Self {
            text: String::new(),
            ping: true,
        }
    }

    /// Message text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether this is a keep-alive ping
    pub fn is_ping(&self) -> bool {
        self.ping
    }

    /// Encode as an event stream frame
    pub fn to_frame(&self) -> Bytes {
        frame::encode(&self.text)
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}
