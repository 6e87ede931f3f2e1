//! Sensor reading fan-out.
//!
//! Each sensor task publishes its readings through a [`FanOut`], which holds
//! one bounded single-slot queue per subscriber. Publishing never blocks: a
//! subscriber that has not drained its slot misses the reading. That is the
//! right behavior for a real-time pipeline; a consumer that falls behind must
//! not accumulate stale scans.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

/// Fan-out publisher with non-blocking single-slot subscribers.
pub struct FanOut<T: Clone> {
    name: &'static str,
    subscribers: Mutex<Vec<mpsc::Sender<T>>>,
    dropped: AtomicU64,
}

impl<T: Clone> FanOut<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            subscribers: Mutex::new(Vec::new()),
            dropped: AtomicU64::new(0),
        }
    }

    /// Register a new subscriber. The returned receiver holds exactly one
    /// outgoing slot; dropping it unsubscribes.
    pub fn subscribe(&self) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel(1);
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Publish a reading to every subscriber without blocking. Full slots drop
    /// the reading; closed subscribers are pruned.
    pub fn publish(&self, reading: T) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| match tx.try_send(reading.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(sensor = self.name, "subscriber slot full, reading dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Close all subscriber channels. Called by the sensor task on stop.
    pub fn close(&self) {
        self.subscribers.lock().unwrap().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Total readings dropped because a subscriber slot was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let fanout = FanOut::<u32>::new("test");
        let mut rx = fanout.subscribe();
        fanout.publish(42u32);
        assert_eq!(rx.recv().await, Some(42));
    }

    #[tokio::test]
    async fn test_full_slot_drops_reading() {
        let fanout = FanOut::<u32>::new("test");
        let mut rx = fanout.subscribe();
        fanout.publish(1u32);
        fanout.publish(2u32);
        assert_eq!(fanout.dropped_count(), 1);
        // The slot still holds the first reading
        assert_eq!(rx.recv().await, Some(1));
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned() {
        let fanout = FanOut::<u32>::new("test");
        let rx = fanout.subscribe();
        assert_eq!(fanout.subscriber_count(), 1);
        drop(rx);
        fanout.publish(7u32);
        assert_eq!(fanout.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_close_ends_stream() {
        let fanout = FanOut::<u32>::new("test");
        let mut rx = fanout.subscribe();
        fanout.close();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_get_reading() {
        let fanout = FanOut::<u32>::new("test");
        let mut rx1 = fanout.subscribe();
        let mut rx2 = fanout.subscribe();
        fanout.publish(9u32);
        assert_eq!(rx1.recv().await, Some(9));
        assert_eq!(rx2.recv().await, Some(9));
    }
}
