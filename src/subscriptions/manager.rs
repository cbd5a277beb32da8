//! Subscription manager for fanning out observed records.

use crate::options::ListenSettings;
use crate::records::Record;
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::types::{Subscription, SubscriptionId};

/// Default number of buffered records per subscriber.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Internal subscription state.
struct Subscriber {
    settings: ListenSettings,
    sender: Sender<Record>,
    dropped: Arc<AtomicU64>,
}

/// Manages subscriptions and publishes records to them.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscriber>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
    /// Channel capacity for new subscriptions.
    buffer_size: usize,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Register a subscription. Returns immediately.
    pub fn subscribe(self: &Arc<Self>, settings: ListenSettings) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(self.buffer_size);
        let dropped = Arc::new(AtomicU64::new(0));

        self.subscriptions.write().insert(
            id,
            Subscriber {
                settings,
                sender,
                dropped: Arc::clone(&dropped),
            },
        );

        Subscription::new(id, receiver, Arc::downgrade(self), dropped)
    }

    /// Remove a subscription, closing its channel. Waits for any publish in
    /// progress, so nothing is sent to it after this returns.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscriptions.write().remove(&id).is_some()
    }

    /// Close every subscription.
    pub fn close_all(&self) {
        self.subscriptions.write().clear();
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Deliver a record to every matching subscription without blocking.
    ///
    /// A full buffer drops this record for that subscriber only.
    pub fn publish(&self, record: &Record) {
        let mut disconnected = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if !sub.settings.matches(record.thread_id()) {
                    continue;
                }
                match sub.sender.try_send(record.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        sub.dropped.fetch_add(1, Ordering::Relaxed);
                        debug!(subscription = id.0, cid = %record.cid(), "subscriber buffer full, record dropped");
                    }
                    Err(TrySendError::Disconnected(_)) => disconnected.push(*id),
                }
            }
        }

        if !disconnected.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in disconnected {
                subs.remove(&id);
            }
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{EncryptionKey, Identity};
    use crate::options::ListenOption;
    use crate::records::LogRecord;
    use crate::types::{ThreadId, ThreadVariant, Timestamp};
    use std::time::Duration;

    fn make_record(thread: &ThreadId) -> Record {
        let author = Identity::generate();
        let value = LogRecord::create(
            thread,
            &author,
            None,
            Timestamp::now(),
            b"{}",
            &EncryptionKey::generate(),
        )
        .unwrap();
        Record::new(value, thread.clone(), author.log_id())
    }

    #[test]
    fn test_subscribe_discard() {
        let manager = Arc::new(SubscriptionManager::new());

        let sub = manager.subscribe(ListenSettings::default());
        assert_eq!(manager.subscription_count(), 1);

        sub.discard();
        assert_eq!(manager.subscription_count(), 0);
        assert!(sub.recv().is_err());
    }

    #[test]
    fn test_discard_twice() {
        let manager = Arc::new(SubscriptionManager::new());
        let sub = manager.subscribe(ListenSettings::default());
        sub.discard();
        sub.discard();
        assert!(sub.is_discarded());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let manager = Arc::new(SubscriptionManager::new());
        {
            let _sub = manager.subscribe(ListenSettings::default());
            assert_eq!(manager.subscription_count(), 1);
        }
        assert_eq!(manager.subscription_count(), 0);
    }

    #[test]
    fn test_publish_to_matching() {
        let manager = Arc::new(SubscriptionManager::new());
        let thread = ThreadId::new(ThreadVariant::AccessControlled);

        let sub = manager.subscribe(ListenSettings::from_options([ListenOption::Thread(
            thread.clone(),
        )]));

        let record = make_record(&thread);
        manager.publish(&record);

        let received = sub.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(received, record);
    }

    #[test]
    fn test_publish_filters_other_threads() {
        let manager = Arc::new(SubscriptionManager::new());
        let watched = ThreadId::new(ThreadVariant::AccessControlled);
        let other = ThreadId::new(ThreadVariant::AccessControlled);

        let sub = manager.subscribe(ListenSettings::from_options([ListenOption::Thread(watched)]));
        manager.publish(&make_record(&other));

        assert!(sub.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_full_buffer_drops_newest() {
        let manager = Arc::new(SubscriptionManager::with_buffer_size(2));
        let thread = ThreadId::new(ThreadVariant::AccessControlled);
        let sub = manager.subscribe(ListenSettings::default());

        let records: Vec<Record> = (0..5).map(|_| make_record(&thread)).collect();
        for record in &records {
            manager.publish(record);
        }

        // Slow subscriber stays registered, keeps the oldest records
        assert_eq!(manager.subscription_count(), 1);
        assert_eq!(sub.dropped(), 3);
        assert_eq!(sub.try_recv().unwrap(), records[0]);
        assert_eq!(sub.try_recv().unwrap(), records[1]);
        assert!(sub.try_recv().is_err());
    }

    #[test]
    fn test_no_delivery_after_discard() {
        let manager = Arc::new(SubscriptionManager::new());
        let thread = ThreadId::new(ThreadVariant::AccessControlled);
        let sub = manager.subscribe(ListenSettings::default());

        manager.publish(&make_record(&thread));
        sub.discard();
        manager.publish(&make_record(&thread));

        assert!(sub.try_recv().is_err());
    }

    #[test]
    fn test_concurrent_discard_unsubscribes_before_returning() {
        use std::sync::atomic::AtomicBool;
        use std::sync::Barrier;
        use std::thread;

        let thread_id = ThreadId::new(ThreadVariant::AccessControlled);
        let record = make_record(&thread_id);

        for _ in 0..50 {
            let manager = Arc::new(SubscriptionManager::new());
            let sub = Arc::new(manager.subscribe(ListenSettings::default()));
            let stop = Arc::new(AtomicBool::new(false));

            let publisher = {
                let manager = Arc::clone(&manager);
                let stop = Arc::clone(&stop);
                let record = record.clone();
                thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        manager.publish(&record);
                    }
                })
            };

            let barrier = Arc::new(Barrier::new(2));
            let discarders: Vec<_> = (0..2)
                .map(|_| {
                    let manager = Arc::clone(&manager);
                    let sub = Arc::clone(&sub);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        sub.discard();
                        manager.subscription_count()
                    })
                })
                .collect();
            for discarder in discarders {
                assert_eq!(discarder.join().unwrap(), 0);
            }

            stop.store(true, Ordering::Relaxed);
            publisher.join().unwrap();
            assert!(sub.try_recv().is_err());
        }
    }
}
