//! Hub implementation
//!
//! The hub owns the subscriber registry, the retention buffer and the inbound
//! queue. A single broadcaster task drains the queue and fans every message
//! out, which gives all subscribers the same total order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::config::HubConfig;
use super::message::Message;
use super::retention::RetentionBuffer;
use super::stats::HubStats;
use super::subscriber::{self, Subscriber, SubscriberHandle};

/// Registry state guarded by a single lock
struct Registry {
    subscribers: HashMap<u64, Subscriber>,
    retention: RetentionBuffer,
}

/// Broadcaster lifecycle, guarded separately from the registry
struct Lifecycle {
    /// Receiving side of the inbound queue, taken by `start`
    inbound: Option<mpsc::Receiver<Message>>,
    /// Running broadcaster, taken by `shutdown`
    broadcaster: Option<JoinHandle<()>>,
}

/// State shared by hub handles, the broadcaster and subscriber handles
pub(crate) struct HubShared {
    config: HubConfig,
    inbound: mpsc::Sender<Message>,
    registry: Mutex<Registry>,
    closed: RwLock<bool>,
    shutdown: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
    stopped: OnceCell<()>,
    next_subscriber_id: AtomicU64,
    broadcast: AtomicU64,
    evicted: AtomicU64,
    dropped: AtomicU64,
}

impl HubShared {
    fn is_closed(&self) -> bool {
        *self.closed.read()
    }

    /// Enqueue without waiting; false when closed or full
    fn try_send(&self, message: Message) -> bool {
        let closed = self.closed.read();
        if *closed {
            return false;
        }

        self.inbound.try_send(message).is_ok()
    }

    pub(crate) fn unregister(&self, id: u64) -> bool {
        let removed = self.registry.lock().subscribers.remove(&id).is_some();

        if removed {
            tracing::debug!(subscriber = id, "Subscriber unregistered");
        }

        removed
    }

    /// Retain a message and offer it to every subscriber
    ///
    /// Offers never wait: a subscriber whose queue is full is evicted on the
    /// spot so one slow consumer cannot stall the others.
    fn broadcast(&self, message: Message) {
        let frame = message.to_frame();
        let mut evicted = Vec::new();

        {
            let mut registry = self.registry.lock();
            registry.retention.push(&message);

            registry
                .subscribers
                .retain(|&id, subscriber| match subscriber.offer(frame.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        evicted.push(id);
                        false
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
        }

        self.broadcast.fetch_add(1, Ordering::Relaxed);

        for id in evicted {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(subscriber = id, "Subscriber evicted, outbound queue full");
        }
    }
}

/// Broadcast hub
///
/// `Hub` is a cheap handle: clones share the same registry, queue and
/// broadcaster.
///
/// # Example
/// ```no_run
/// use std::time::Duration;
/// use ssehub::{Hub, HubConfig};
///
/// # async fn example() {
/// let hub = Hub::new(HubConfig::default().keep_alive(Duration::from_secs(5)));
/// hub.start();
///
/// hub.send("hello").await;
///
/// hub.shutdown().await;
/// # }
/// ```
#[derive(Clone)]
pub struct Hub {
    shared: Arc<HubShared>,
}

impl Hub {
    /// Create a hub. Call [`Hub::start`] to begin broadcasting.
    pub fn new(config: HubConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.inbound_capacity.max(1));
        let retention = RetentionBuffer::new(config.retention);

        let shared = HubShared {
            config,
            inbound: tx,
            registry: Mutex::new(Registry {
                subscribers: HashMap::new(),
                retention,
            }),
            closed: RwLock::new(false),
            shutdown: CancellationToken::new(),
            lifecycle: Mutex::new(Lifecycle {
                inbound: Some(rx),
                broadcaster: None,
            }),
            stopped: OnceCell::new(),
            next_subscriber_id: AtomicU64::new(1),
            broadcast: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        };

        Self {
            shared: Arc::new(shared),
        }
    }

    /// Hub configuration
    pub fn config(&self) -> &HubConfig {
        &self.shared.config
    }

    /// Publish a message
    ///
    /// Waits while the inbound queue is full, until space frees up or the hub
    /// shuts down. Sending to a closed hub is a silent no-op.
    pub async fn send(&self, message: impl Into<Message>) {
        let message = message.into();

        if self.shared.is_closed() {
            return;
        }

        tokio::select! {
            biased;
            _ = self.shared.shutdown.cancelled() => {}
            _ = self.shared.inbound.send(message) => {}
        }
    }

    /// Publish a message without waiting
    ///
    /// Returns false if the hub is closed or the inbound queue is full.
    pub fn try_send(&self, message: impl Into<Message>) -> bool {
        self.shared.try_send(message.into())
    }

    /// Start the broadcaster
    ///
    /// Only the first call has an effect; starting a hub that was shut down
    /// does nothing.
    pub fn start(&self) {
        let mut lifecycle = self.shared.lifecycle.lock();

        if self.shared.is_closed() {
            return;
        }

        let Some(inbound) = lifecycle.inbound.take() else {
            return;
        };

        let shared = Arc::clone(&self.shared);
        lifecycle.broadcaster = Some(tokio::spawn(run_broadcaster(shared, inbound)));

        tracing::info!(
            keep_alive_ms = self.shared.config.keep_alive.as_millis() as u64,
            retention = self.shared.config.retention,
            "Hub started"
        );
    }

    /// Shut the hub down
    ///
    /// Marks the hub closed, stops the broadcaster and waits for it to exit,
    /// then terminates every registered subscriber. Later calls (and calls
    /// racing with the first one) wait for that same teardown.
    pub async fn shutdown(&self) {
        let shared = &self.shared;

        shared
            .stopped
            .get_or_init(|| async {
                *shared.closed.write() = true;
                shared.shutdown.cancel();

                let broadcaster = {
                    let mut lifecycle = shared.lifecycle.lock();
                    lifecycle.inbound = None;
                    lifecycle.broadcaster.take()
                };

                if let Some(handle) = broadcaster {
                    if let Err(e) = handle.await {
                        tracing::error!(error = %e, "Broadcaster task failed");
                    }
                }

                let terminated = {
                    let mut registry = shared.registry.lock();
                    for subscriber in registry.subscribers.values() {
                        subscriber.terminate();
                    }
                    let count = registry.subscribers.len();
                    registry.subscribers.clear();
                    count
                };

                tracing::info!(subscribers = terminated, "Hub stopped");
            })
            .await;
    }

    /// Whether shutdown has begun
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Register a new subscriber
    ///
    /// Returns the delivery handle together with the retained messages to
    /// replay, oldest first. Both are taken under the registry lock, so no
    /// message is missed or duplicated between replay and live delivery.
    /// Returns `None` once the hub is closed.
    pub fn register(&self) -> Option<(SubscriberHandle, Vec<Message>)> {
        let closed = self.shared.closed.read();
        if *closed {
            return None;
        }

        let id = self.shared.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (subscriber, handle) = subscriber::channel(
            id,
            self.shared.config.subscriber_capacity,
            Arc::downgrade(&self.shared),
        );

        let replay = {
            let mut registry = self.shared.registry.lock();
            registry.subscribers.insert(id, subscriber);
            registry.retention.snapshot()
        };
        drop(closed);

        tracing::debug!(
            subscriber = id,
            replay = replay.len(),
            "Subscriber registered"
        );

        Some((handle, replay))
    }

    /// Remove a subscriber from the registry
    ///
    /// Returns false if it was already gone. Dropping a [`SubscriberHandle`]
    /// does this automatically.
    pub fn unregister(&self, id: u64) -> bool {
        self.shared.unregister(id)
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.shared.registry.lock().subscribers.len()
    }

    /// Retained messages, oldest first
    pub fn retained(&self) -> Vec<Message> {
        self.shared.registry.lock().retention.snapshot()
    }

    /// Snapshot of hub counters
    pub fn stats(&self) -> HubStats {
        let (subscribers, retained) = {
            let registry = self.shared.registry.lock();
            (registry.subscribers.len(), registry.retention.len())
        };

        HubStats {
            subscribers,
            retained,
            broadcast: self.shared.broadcast.load(Ordering::Relaxed),
            evicted: self.shared.evicted.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            closed: self.is_closed(),
        }
    }

    /// Count a message that had to be discarded on the non-waiting path
    pub(crate) fn record_dropped(&self) {
        self.shared.dropped.fetch_add(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("config", &self.shared.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Broadcaster loop
///
/// Reacts to shutdown first, then inbound messages, then keep-alive ticks.
/// Shutdown exits immediately; queued messages are not drained.
async fn run_broadcaster(shared: Arc<HubShared>, mut inbound: mpsc::Receiver<Message>) {
    let mut keep_alive = shared.config.keep_alive_period().map(|period| {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            message = inbound.recv() => match message {
                Some(message) => shared.broadcast(message),
                None => break,
            },
            _ = next_tick(&mut keep_alive) => {
                // A full queue already means traffic is flowing
                shared.try_send(Message::ping());
            }
        }
    }

    tracing::debug!("Broadcaster stopped");
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
