//! Subscriber endpoints
//!
//! A subscriber is split in two halves:
//!
//! - [`Subscriber`] lives in the hub registry and owns the sending side of the
//!   outbound queue. The broadcaster offers frames to it without blocking.
//! - [`SubscriberHandle`] is held by the delivery surface. It drains the queue
//!   and watches the shutdown signal. Dropping it unregisters the subscriber.
//!
//! Removing the [`Subscriber`] from the registry drops the sender, which closes
//! the queue: the handle sees `None` once the frames already queued are read.

use std::sync::Weak;

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use super::store::HubShared;

/// Registry side of a subscriber
#[derive(Debug)]
pub(crate) struct Subscriber {
    outbound: mpsc::Sender<Bytes>,
    shutdown: CancellationToken,
}

impl Subscriber {
    /// Offer a frame without waiting
    pub(crate) fn offer(&self, frame: Bytes) -> Result<(), TrySendError<Bytes>> {
        self.outbound.try_send(frame)
    }

    /// Ask the delivery side to stop
    pub(crate) fn terminate(&self) {
        self.shutdown.cancel();
    }
}

/// Delivery side of a subscriber
pub struct SubscriberHandle {
    id: u64,
    outbound: mpsc::Receiver<Bytes>,
    shutdown: CancellationToken,
    hub: Weak<HubShared>,
}

impl SubscriberHandle {
    /// Subscriber ID, unique within its hub
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Receive the next encoded frame
    ///
    /// Returns `None` once the hub closed the queue (eviction or shutdown) and
    /// every frame queued before that was read.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.outbound.recv().await
    }

    /// Token cancelled when the hub tears this subscriber down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Whether the hub asked this subscriber to stop
    pub fn is_terminated(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl std::fmt::Debug for SubscriberHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberHandle")
            .field("id", &self.id)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unregister(self.id);
        }
    }
}

/// Create both halves of a subscriber
pub(crate) fn channel(
    id: u64,
    capacity: usize,
    hub: Weak<HubShared>,
) -> (Subscriber, SubscriberHandle) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let shutdown = CancellationToken::new();

    let subscriber = Subscriber {
        outbound: tx,
        shutdown: shutdown.clone(),
    };
    let handle = SubscriberHandle {
        id,
        outbound: rx,
        shutdown,
        hub,
    };

    (subscriber, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offer_until_full() {
        let (subscriber, mut handle) = channel(7, 2, Weak::new());

        assert_eq!(handle.id(), 7);
        assert!(subscriber.offer(Bytes::from_static(b"1")).is_ok());
        assert!(subscriber.offer(Bytes::from_static(b"2")).is_ok());
        assert!(matches!(
            subscriber.offer(Bytes::from_static(b"3")),
            Err(TrySendError::Full(_))
        ));

        assert_eq!(handle.recv().await.unwrap(), Bytes::from_static(b"1"));
    }

    #[tokio::test]
    async fn test_dropping_subscriber_closes_queue() {
        let (subscriber, mut handle) = channel(1, 4, Weak::new());

        subscriber.offer(Bytes::from_static(b"last")).unwrap();
        drop(subscriber);

        // Frames queued before the close are still delivered
        assert_eq!(handle.recv().await.unwrap(), Bytes::from_static(b"last"));
        assert!(handle.recv().await.is_none());
    }

    #[test]
    fn test_terminate() {
        let (subscriber, handle) = channel(1, 1, Weak::new());
        let token = handle.shutdown_token();

        assert!(!handle.is_terminated());
        subscriber.terminate();
        assert!(handle.is_terminated());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_closed_after_handle_drop() {
        let (subscriber, handle) = channel(1, 1, Weak::new());
        drop(handle);

        assert!(matches!(
            subscriber.offer(Bytes::new()),
            Err(TrySendError::Closed(_))
        ));
    }
}
