//! Subscription handle for live record delivery.

use super::SubscriptionManager;
use crate::records::Record;
use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Receives records as they are observed locally.
///
/// The channel is bounded; when it is full new records are dropped for this
/// subscriber and counted in [`Subscription::dropped`]. Use
/// [`Threadservice::pull`](crate::Threadservice::pull) to recover anything
/// missed. The channel closes once the subscription is discarded, which also
/// happens on drop.
pub struct Subscription {
    id: SubscriptionId,
    receiver: Receiver<Record>,
    manager: Weak<SubscriptionManager>,
    dropped: Arc<AtomicU64>,
    discarded: AtomicBool,
}

impl Subscription {
    pub(super) fn new(
        id: SubscriptionId,
        receiver: Receiver<Record>,
        manager: Weak<SubscriptionManager>,
        dropped: Arc<AtomicU64>,
    ) -> Self {
        Self {
            id,
            receiver,
            manager,
            dropped,
            discarded: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The channel that receives records.
    pub fn channel(&self) -> &Receiver<Record> {
        &self.receiver
    }

    /// Receive the next record (blocking). Errors once discarded.
    pub fn recv(&self) -> Result<Record, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a record (non-blocking).
    pub fn try_recv(&self) -> Result<Record, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Record, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Records not delivered because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded.load(Ordering::SeqCst)
    }

    /// Stop receiving records and close the channel.
    ///
    /// Safe to call more than once. Once this returns nothing further is
    /// sent, and records still buffered are discarded.
    pub fn discard(&self) {
        self.discarded.store(true, Ordering::SeqCst);
        // Every caller unsubscribes, so a concurrent discard cannot return
        // while the subscription is still registered.
        if let Some(manager) = self.manager.upgrade() {
            manager.unsubscribe(self.id);
        }
        while self.receiver.try_recv().is_ok() {}
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.discard();
    }
}
