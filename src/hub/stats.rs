//! Hub statistics

/// Point-in-time counters of a hub
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Currently registered subscribers
    pub subscribers: usize,
    /// Messages held for replay
    pub retained: usize,
    /// Messages fanned out by the broadcaster (pings included)
    pub broadcast: u64,
    /// Subscribers evicted because their queue was full
    pub evicted: u64,
    /// Writer lines discarded because the inbound queue was full
    pub dropped: u64,
    /// Whether the hub has been shut down
    pub closed: bool,
}
