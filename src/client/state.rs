//! Receiver state machine
//!
//! ```text
//! Unconnected ──connect──► Connecting ──200 OK──► Streaming
//!                               │                     │
//!                               └──error──► Closed ◄──┘ end of stream / shutdown
//! ```

/// Receiver lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientState {
    /// Created, `connect` not called yet
    #[default]
    Unconnected,

    /// Request sent, waiting for the response head
    Connecting,

    /// Lines are being received
    Streaming,

    /// Terminal: the stream ended, failed or was shut down
    Closed,
}

impl ClientState {
    /// Lines may still arrive
    pub fn is_live(&self) -> bool {
        matches!(self, ClientState::Streaming)
    }

    /// No further transition is possible
    pub fn is_closed(&self) -> bool {
        matches!(self, ClientState::Closed)
    }
}
