//! Bounded hand-off queue that drops the oldest unit instead of blocking.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use num_complex::Complex32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Something with a sample count, so drops can be reported in samples.
pub trait QueueUnit {
    fn samples(&self) -> usize;
}

impl QueueUnit for Vec<f32> {
    fn samples(&self) -> usize {
        self.len()
    }
}

impl QueueUnit for Vec<Complex32> {
    fn samples(&self) -> usize {
        self.len()
    }
}

/// Attempts to make room before the incoming unit itself is dropped.
const MAX_EVICTIONS: usize = 4;

/// Producer side of a drop-oldest queue.
///
/// The queue keeps a receiver of its own so a full channel can be made room
/// in by evicting the oldest unit. Dropping the queue disconnects the
/// consumer once it has drained what is left.
pub struct DropOldestQueue<T> {
    tx: Sender<T>,
    evict: Receiver<T>,
    dropped: Arc<AtomicU64>,
}

impl<T: QueueUnit> DropOldestQueue<T> {
    /// Returns the queue and the receiver for the consumer.
    pub fn new(depth: usize, dropped: Arc<AtomicU64>) -> (Self, Receiver<T>) {
        let (tx, rx) = bounded(depth.max(1));
        let queue = Self {
            tx,
            evict: rx.clone(),
            dropped,
        };
        (queue, rx)
    }

    /// Enqueue without blocking.
    pub fn push(&self, unit: T) {
        let mut unit = unit;
        for _ in 0..MAX_EVICTIONS {
            match self.tx.try_send(unit) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => return,
                Err(TrySendError::Full(back)) => {
                    if let Ok(old) = self.evict.try_recv() {
                        self.count_drop(old.samples());
                    }
                    unit = back;
                }
            }
        }
        self.count_drop(unit.samples());
    }

    fn count_drop(&self, samples: usize) {
        self.dropped.fetch_add(samples as u64, Ordering::Relaxed);
        log::debug!("Recording queue full, dropped {} samples", samples);
    }

    /// Total samples dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_drops_oldest() {
        let (queue, rx) = DropOldestQueue::new(2, Arc::new(AtomicU64::new(0)));
        queue.push(vec![1.0f32; 10]);
        queue.push(vec![2.0f32; 20]);
        queue.push(vec![3.0f32; 30]);

        assert_eq!(queue.dropped(), 10);
        assert_eq!(queue.len(), 2);
        assert_eq!(rx.recv().unwrap()[0], 2.0);
        assert_eq!(rx.recv().unwrap()[0], 3.0);
    }

    #[test]
    fn push_never_blocks_without_consumer_progress() {
        let (queue, _rx) = DropOldestQueue::new(1, Arc::new(AtomicU64::new(0)));
        for _ in 0..1000 {
            queue.push(vec![Complex32::new(0.0, 0.0); 4]);
        }
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dropped(), 999 * 4);
    }

    #[test]
    fn dropping_queue_disconnects_consumer_after_drain() {
        let (queue, rx) = DropOldestQueue::new(4, Arc::new(AtomicU64::new(0)));
        queue.push(vec![0.5f32; 3]);
        drop(queue);
        assert_eq!(rx.recv().unwrap().len(), 3);
        assert!(rx.recv().is_err());
    }
}
