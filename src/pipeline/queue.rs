//! Bounded queue that never blocks its producer.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Producer half of a drop-oldest queue.
///
/// When the queue is full the oldest buffered item is discarded to make room
/// and the shared drop counter is incremented. `push` never waits.
#[derive(Debug)]
pub struct DropOldestSender<T> {
    tx: Sender<T>,
    // Held only to evict from the head of the queue.
    evict: Receiver<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for DropOldestSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            evict: self.evict.clone(),
            dropped: self.dropped.clone(),
        }
    }
}

/// Create a drop-oldest queue holding at most `capacity` items.
pub fn drop_oldest<T>(capacity: usize) -> (DropOldestSender<T>, Receiver<T>) {
    let (tx, rx) = bounded(capacity.max(1));
    let sender = DropOldestSender {
        tx,
        evict: rx.clone(),
        dropped: Arc::new(AtomicU64::new(0)),
    };
    (sender, rx)
}

impl<T> DropOldestSender<T> {
    /// Enqueue `item`, evicting the oldest item if the queue is full.
    ///
    /// Returns the item back if the queue is disconnected.
    pub fn push(&self, mut item: T) -> Result<(), T> {
        loop {
            match self.tx.try_send(item) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(rejected)) => {
                    // The consumer may have drained it in between; either way retry.
                    if self.evict.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    item = rejected;
                }
                Err(TrySendError::Disconnected(rejected)) => return Err(rejected),
            }
        }
    }

    /// Number of items evicted so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Shared handle to the eviction counter.
    pub fn drop_counter(&self) -> Arc<AtomicU64> {
        self.dropped.clone()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}
