//! Best-effort sample distribution.
//!
//! The bus is called synchronously from the acquisition worker. Each sample
//! is handed to every subscriber registered at publish time, in registration
//! order. There is no buffering, retry or backpressure: a subscriber that
//! panics is logged and skipped, and a channel subscriber that is full simply
//! misses the sample.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::sample::Sample;

/// Callback invoked for every published sample.
pub type SampleCallback = dyn Fn(&Sample) + Send + Sync;

/// Handle returned by `subscribe`, used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Clone)]
enum Subscriber {
    Callback(Arc<SampleCallback>),
    Channel(mpsc::Sender<Arc<Sample>>),
}

/// Per-device fan-out of published samples.
pub struct EventBus {
    device: String,
    subscribers: RwLock<Vec<(SubscriptionId, Subscriber)>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Bus without subscribers.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a callback. It runs on the publishing thread.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Sample) + Send + Sync + 'static,
    {
        self.register(Subscriber::Callback(Arc::new(callback)))
    }

    /// Deliver samples into a bounded channel. Samples are dropped while the
    /// channel is full.
    pub fn subscribe_channel(&self, capacity: usize) -> (SubscriptionId, mpsc::Receiver<Arc<Sample>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (self.register(Subscriber::Channel(tx)), rx)
    }

    /// Remove a subscriber. Returns false for an unknown id.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver `sample` to every current subscriber. Returns how many
    /// subscribers accepted it.
    pub fn publish(&self, sample: &Arc<Sample>) -> usize {
        // Snapshot so callbacks may (un)subscribe without deadlocking.
        let subscribers: Vec<(SubscriptionId, Subscriber)> = self.subscribers.read().clone();
        let mut delivered = 0;

        for (id, subscriber) in subscribers {
            match subscriber {
                Subscriber::Callback(callback) => {
                    let outcome = catch_unwind(AssertUnwindSafe(|| callback(sample.as_ref())));
                    match outcome {
                        Ok(()) => delivered += 1,
                        Err(_) => warn!(
                            device = %self.device,
                            subscriber = %id,
                            sequence = sample.sequence,
                            "Subscriber panicked; continuing with the next one"
                        ),
                    }
                }
                Subscriber::Channel(tx) => match tx.try_send(Arc::clone(sample)) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        trace!(device = %self.device, subscriber = %id, "Channel full, dropping sample");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        trace!(device = %self.device, subscriber = %id, "Channel closed");
                    }
                },
            }
        }

        delivered
    }

    fn register(&self, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, subscriber));
        id
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("device", &self.device)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
