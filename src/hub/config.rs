//! Hub configuration

use std::time::Duration;

/// Default period between keep-alive pings
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Default capacity of the inbound message queue
pub const DEFAULT_INBOUND_CAPACITY: usize = 100;

/// Default capacity of each subscriber's outbound queue
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 10;

/// Hub configuration options
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Period between synthetic ping frames (zero disables keep-alives)
    pub keep_alive: Duration,

    /// Number of recent messages replayed to new subscribers (0 = no replay)
    pub retention: usize,

    /// Answer plain (non event-stream) requests with an error instead of the log page
    pub disable_page: bool,

    /// Inbound queue capacity; `send` waits when it is full
    pub inbound_capacity: usize,

    /// Per-subscriber queue capacity; a subscriber overflowing it is evicted
    pub subscriber_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            keep_alive: DEFAULT_KEEP_ALIVE,
            retention: 0,
            disable_page: false,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
        }
    }
}

impl HubConfig {
    /// Set the keep-alive period
    pub fn keep_alive(mut self, period: Duration) -> Self {
        self.keep_alive = period;
        self
    }

    /// Disable keep-alive pings
    pub fn disable_keep_alive(mut self) -> Self {
        self.keep_alive = Duration::ZERO;
        self
    }

    /// Set how many messages are kept for replay
    pub fn retention(mut self, limit: usize) -> Self {
        self.retention = limit;
        self
    }

    /// Reject plain requests instead of serving the log page
    pub fn disable_page(mut self) -> Self {
        self.disable_page = true;
        self
    }

    /// Set the inbound queue capacity (at least 1)
    pub fn inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity.max(1);
        self
    }

    /// Set the per-subscriber queue capacity (at least 1)
    pub fn subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_capacity = capacity.max(1);
        self
    }

    pub(crate) fn keep_alive_period(&self) -> Option<Duration> {
        (!self.keep_alive.is_zero()).then_some(self.keep_alive)
    }
}
