//! Fan-out event bus
//!
//! Subscribers register a bounded mailbox (a `tokio::sync::mpsc::Sender`)
//! and receive every event published after they attached.
//!
//! # Delivery
//!
//! - Each attached mailbox receives every event, in publication order.
//! - Delivery order across distinct mailboxes is unspecified.
//! - Sends apply backpressure: a full mailbox makes [`ObserverBus::notify`]
//!   wait until the subscriber drains it. A slow subscriber therefore stalls
//!   the publisher; events are never dropped or coalesced.
//! - A mailbox whose receiver has been dropped is pruned on the next notify.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Sending half of a subscriber's mailbox.
pub type Mailbox<E> = mpsc::Sender<E>;

/// Fan-out notifier over bounded subscriber mailboxes.
///
/// Registration is keyed by mailbox identity (`Sender::same_channel`), not by
/// any logical subscriber name: attaching a clone of an already-attached
/// sender is a no-op, and detaching requires a sender of the same channel.
///
/// Cloning the bus shares the registry.
pub struct ObserverBus<E> {
    mailboxes: Arc<Mutex<Vec<Mailbox<E>>>>,
}

impl<E> ObserverBus<E>
where
    E: Clone + Send + 'static,
{
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            mailboxes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a mailbox
    ///
    /// Returns `false` if a sender for the same channel is already attached.
    pub fn attach(&self, mailbox: Mailbox<E>) -> bool {
        let mut mailboxes = self.mailboxes.lock();
        if mailboxes.iter().any(|m| m.same_channel(&mailbox)) {
            debug!("Mailbox already attached, ignoring");
            return false;
        }
        mailboxes.push(mailbox);
        debug!(subscribers = mailboxes.len(), "Attached subscriber mailbox");
        true
    }

    /// Create a mailbox with the given capacity, attach it, and return both halves
    pub fn subscribe(&self, capacity: usize) -> (Mailbox<E>, mpsc::Receiver<E>) {
        let (tx, rx) = mpsc::channel(capacity);
        self.attach(tx.clone());
        (tx, rx)
    }

    /// Remove a mailbox
    ///
    /// Returns `true` if a mailbox for the same channel was attached.
    pub fn detach(&self, mailbox: &Mailbox<E>) -> bool {
        let mut mailboxes = self.mailboxes.lock();
        let Some(index) = mailboxes.iter().position(|m| m.same_channel(mailbox)) else {
            trace!("Detach requested for unknown mailbox");
            return false;
        };
        mailboxes.remove(index);
        debug!(subscribers = mailboxes.len(), "Detached subscriber mailbox");
        true
    }

    /// Number of attached mailboxes
    pub fn subscriber_count(&self) -> usize {
        self.mailboxes.lock().len()
    }

    /// Deliver an event to every attached mailbox
    ///
    /// Waits for space in each mailbox in turn. Returns the number of
    /// mailboxes the event was delivered to.
    pub async fn notify(&self, event: E) -> usize {
        // Snapshot so the registry lock is never held across an await.
        let snapshot: Vec<Mailbox<E>> = self.mailboxes.lock().clone();
        if snapshot.is_empty() {
            trace!("No subscribers attached, event not delivered");
            return 0;
        }

        let mut delivered = 0;
        let mut closed = Vec::new();
        for mailbox in snapshot {
            match mailbox.send(event.clone()).await {
                Ok(()) => delivered += 1,
                Err(_) => closed.push(mailbox),
            }
        }

        if !closed.is_empty() {
            warn!(
                closed = closed.len(),
                "Pruning subscriber mailboxes whose receivers were dropped"
            );
            self.mailboxes
                .lock()
                .retain(|m| !closed.iter().any(|c| c.same_channel(m)));
        }

        trace!(delivered, "Event delivered");
        delivered
    }
}

impl<E> Default for ObserverBus<E>
where
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for ObserverBus<E> {
    fn clone(&self) -> Self {
        Self {
            mailboxes: Arc::clone(&self.mailboxes),
        }
    }
}

impl<E> fmt::Debug for ObserverBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverBus")
            .field("subscribers", &self.mailboxes.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_notify_reaches_every_subscriber_in_order() {
        let bus = ObserverBus::new();
        let (_tx1, mut rx1) = bus.subscribe(8);
        let (_tx2, mut rx2) = bus.subscribe(8);

        assert_eq!(bus.notify(1u32).await, 2);
        assert_eq!(bus.notify(2u32).await, 2);

        assert_eq!(rx1.recv().await, Some(1));
        assert_eq!(rx1.recv().await, Some(2));
        assert_eq!(rx2.recv().await, Some(1));
        assert_eq!(rx2.recv().await, Some(2));
    }

    #[tokio::test]
    async fn test_attach_is_keyed_by_mailbox_identity() {
        let bus: ObserverBus<u32> = ObserverBus::new();
        let (tx, _rx) = mpsc::channel(1);

        assert!(bus.attach(tx.clone()));
        assert!(!bus.attach(tx.clone()));
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_detach_removes_only_matching_mailbox() {
        let bus = ObserverBus::new();
        let (tx1, mut rx1) = bus.subscribe(4);
        let (_tx2, mut rx2) = bus.subscribe(4);
        let (stranger, _rx3) = mpsc::channel::<u32>(1);

        assert!(!bus.detach(&stranger));
        assert!(bus.detach(&tx1));
        assert!(!bus.detach(&tx1));
        assert_eq!(bus.subscriber_count(), 1);

        assert_eq!(bus.notify(7u32).await, 1);
        assert_eq!(rx2.recv().await, Some(7));

        drop(tx1);
        assert!(rx1.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned() {
        let bus = ObserverBus::new();
        let (_tx1, rx1) = bus.subscribe(1);
        let (_tx2, mut rx2) = bus.subscribe(1);
        drop(rx1);

        assert_eq!(bus.notify(3u32).await, 1);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(rx2.recv().await, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_mailbox_applies_backpressure() {
        let bus = ObserverBus::new();
        let (_tx, mut rx) = bus.subscribe(1);

        assert_eq!(bus.notify(1u32).await, 1);

        // Mailbox is full: the second notify cannot complete until a receive.
        let blocked = tokio::time::timeout(Duration::from_millis(50), bus.notify(2u32)).await;
        assert!(blocked.is_err());

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(bus.notify(3u32).await, 1);
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test]
    async fn test_clone_shares_registry() {
        let bus = ObserverBus::new();
        let shared = bus.clone();
        let (_tx, mut rx) = shared.subscribe(1);

        assert_eq!(bus.subscriber_count(), 1);
        bus.notify(9u32).await;
        assert_eq!(rx.recv().await, Some(9));
    }
}
