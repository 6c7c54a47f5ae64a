//! Receiver configuration

use std::time::Duration;

use reqwest::Method;

/// Stream receiver configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP method used to open the stream
    pub method: Method,

    /// Consumption buffer capacity
    ///
    /// `0` disables buffering: `next_line` only relays the latest line.
    /// Otherwise the buffer keeps at most this many unread lines and drops
    /// the oldest one on overflow.
    pub buffer_size: usize,

    /// Terminate every line written to the output sink with `\n`
    pub append_newline: bool,

    /// TCP connect timeout (None = no timeout)
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            method: Method::GET,
            buffer_size: 0,
            append_newline: false,
            connect_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Set the request method
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the consumption buffer capacity
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Append `\n` to lines written to the output sink
    pub fn append_newline(mut self) -> Self {
        self.append_newline = true;
        self
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub(crate) fn is_buffered(&self) -> bool {
        self.buffer_size > 0
    }
}
