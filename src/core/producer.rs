//! # Producer: pushes work into a channel's queue.
//!
//! A [`Producer`] is a cheap, cloneable handle onto a [`BoundedQueue`].
//! `send` returns once the item is enqueued, not once it is processed.
//!
//! ## Rules
//! - Items from one producer keep their order on the shared queue.
//! - No ordering guarantee across producers.
//! - A rejected item is handed back in [`Rejected`]; it is never dropped silently.

use std::sync::Arc;

use crate::{
    error::Rejected,
    events::{Bus, Event, EventKind},
    queue::BoundedQueue,
};

/// Handle for pushing items into a queue.
pub struct Producer<T> {
    queue: Arc<BoundedQueue<T>>,
    bus: Bus,
    channel: Arc<str>,
}

impl<T> Producer<T> {
    /// Creates a producer for a standalone queue.
    pub fn new(queue: Arc<BoundedQueue<T>>) -> Self {
        Self::attached(queue, Bus::new(1), "queue")
    }

    pub(crate) fn attached(
        queue: Arc<BoundedQueue<T>>,
        bus: Bus,
        channel: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            queue,
            bus,
            channel: channel.into(),
        }
    }

    /// Enqueues `item`, honoring the queue's [`OverflowPolicy`](crate::OverflowPolicy).
    ///
    /// Suspends while the queue is full under `Block`; fails with
    /// [`QueueError::Full`](crate::QueueError::Full) under `Reject`.
    pub async fn send(&self, item: T) -> Result<(), Rejected<T>> {
        self.queue
            .enqueue(item)
            .await
            .map_err(|rejected| self.report(rejected))
    }

    /// Enqueues `item` without ever suspending.
    pub fn try_send(&self, item: T) -> Result<(), Rejected<T>> {
        self.queue
            .try_enqueue(item)
            .map_err(|rejected| self.report(rejected))
    }

    /// Current queue depth.
    pub fn size(&self) -> usize {
        self.queue.size()
    }

    /// Whether the queue no longer accepts items.
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    fn report(&self, rejected: Rejected<T>) -> Rejected<T> {
        let depth = self.queue.size();
        tracing::debug!(
            channel = %self.channel,
            depth,
            label = rejected.error().as_label(),
            "item rejected"
        );
        self.bus.publish(
            Event::new(EventKind::ProducerRejected)
                .with_consumer(Arc::clone(&self.channel))
                .with_reason(rejected.error().as_label())
                .with_depth(depth),
        );
        rejected
    }
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            bus: self.bus.clone(),
            channel: Arc::clone(&self.channel),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverflowPolicy;
    use crate::error::QueueError;

    #[tokio::test]
    async fn test_rejection_is_published() {
        let q = Arc::new(BoundedQueue::new(1, OverflowPolicy::Reject));
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let p = Producer::attached(q, bus, "jobs");

        p.send("a").await.unwrap();
        let rejected = p.send("b").await.unwrap_err();
        assert_eq!(rejected.error(), QueueError::Full);
        assert_eq!(*rejected.item(), "b");

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::ProducerRejected);
        assert_eq!(ev.reason.as_deref(), Some("queue_full"));
        assert_eq!(ev.depth, Some(1));
    }

    #[tokio::test]
    async fn test_clones_share_queue_and_keep_per_producer_order() {
        let q = Arc::new(BoundedQueue::unbounded());
        let p1 = Producer::new(q.clone());
        let p2 = p1.clone();

        p1.send(("p1", 0)).await.unwrap();
        p2.send(("p2", 0)).await.unwrap();
        p1.send(("p1", 1)).await.unwrap();
        assert_eq!(p2.size(), 3);

        let mut from_p1 = Vec::new();
        for _ in 0..3 {
            let (who, n) = q.dequeue().await.unwrap();
            if who == "p1" {
                from_p1.push(n);
            }
        }
        assert_eq!(from_p1, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_closed_queue_rejects() {
        let q = Arc::new(BoundedQueue::<u8>::unbounded());
        let p = Producer::new(q.clone());
        q.close();
        assert!(p.is_closed());
        assert_eq!(p.try_send(1).unwrap_err().error(), QueueError::Closed);
    }
}
