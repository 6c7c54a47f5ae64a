//! Writer adapters
//!
//! Lets any text output be redirected into a hub. Each `write` call becomes
//! one message, with surrounding whitespace (the trailing newline of a log
//! line, typically) trimmed off.
//!
//! ```no_run
//! use ssehub::{Hub, HubConfig};
//! use tracing_subscriber::prelude::*;
//!
//! # async fn example() {
//! let hub = Hub::new(HubConfig::default());
//! hub.start();
//!
//! tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer())
//!     .with(hub.log_layer())
//!     .init();
//!
//! tracing::info!("visible on stdout and on every stream");
//! # }
//! ```

use std::io;

use tokio::runtime::Handle;
use tracing_subscriber::fmt::{self, format, MakeWriter};
use tracing_subscriber::registry::LookupSpan;

use super::message::Message;
use super::store::Hub;

/// `std::io::Write` adapter publishing into a hub
#[derive(Debug, Clone)]
pub struct HubWriter {
    hub: Hub,
}

impl HubWriter {
    /// Create a writer for a hub
    pub fn new(hub: Hub) -> Self {
        Self { hub }
    }

    /// Publish one line
    ///
    /// Writers are synchronous. Off the runtime the call waits like
    /// [`Hub::send`]; on a runtime thread it must not park, so a line that
    /// finds the inbound queue full is dropped and counted instead.
    fn publish(&self, text: &str) {
        if self.hub.is_closed() {
            return;
        }

        let message = Message::new(text);

        if Handle::try_current().is_ok() {
            if !self.hub.try_send(message) && !self.hub.is_closed() {
                self.hub.record_dropped();
            }
        } else {
            futures::executor::block_on(self.hub.send(message));
        }
    }
}

impl io::Write for HubWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        self.publish(text.trim());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Hub {
    type Writer = HubWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer()
    }
}

impl Hub {
    /// Writer whose every `write` publishes one message
    pub fn writer(&self) -> HubWriter {
        HubWriter::new(self.clone())
    }

    /// Formatting layer that mirrors log lines into the hub
    ///
    /// ANSI colors are disabled so lines arrive as plain text.
    pub fn log_layer<S>(&self) -> fmt::Layer<S, format::DefaultFields, format::Format, Hub>
    where
        S: tracing::Subscriber + for<'span> LookupSpan<'span>,
    {
        fmt::layer().with_ansi(false).with_writer(self.clone())
    }
}
