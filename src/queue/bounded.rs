//! # Fixed-capacity FIFO shared by producers and consumers.
//!
//! [`BoundedQueue`] decouples producers from consumers. It is the only shared
//! mutable resource of a channel.
//!
//! ## Architecture
//! ```text
//! enqueue(item) ──► [slots semaphore] ──► VecDeque (tail) ──► [available semaphore] ──► dequeue()
//!   (waits when full,                                          (waits when empty,
//!    or Full on Reject)                                         cancel-safe)
//! ```
//!
//! ## Rules
//! - **FIFO**: items leave in the order they were inserted.
//! - **Never drops**: a full queue either suspends the producer or returns the item as [`Rejected`].
//! - **Fair wake-up**: blocked producers acquire free slots in arrival order.
//! - **Cancel-safe dequeue**: dropping a pending `dequeue` future never loses an item.
//! - **Close drains**: after [`close`](BoundedQueue::close) consumers still receive the
//!   remaining items, then observe [`QueueError::Closed`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Semaphore, TryAcquireError};

use crate::config::OverflowPolicy;
use crate::error::{QueueError, Rejected};
use crate::queue::delivery::{Delivery, Progress, Ticket};

/// Thread-safe FIFO buffer with optional capacity and acknowledgment tracking.
///
/// ### Counters
/// - `size()`: items enqueued and not yet dequeued (bounded by `capacity`)
/// - `unfinished()`: items enqueued and not yet acknowledged (what `join` waits for)
pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    /// One permit per buffered item.
    available: Semaphore,
    /// One permit per free slot; `None` when unbounded.
    slots: Option<Semaphore>,
    capacity: usize,
    overflow: OverflowPolicy,
    progress: Arc<Progress>,
    closed: AtomicBool,
}

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` items (`0` = unbounded).
    pub fn new(capacity: usize, overflow: OverflowPolicy) -> Self {
        let capacity = capacity.min(Semaphore::MAX_PERMITS);
        let slots = (capacity > 0).then(|| Semaphore::new(capacity));

        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            available: Semaphore::new(0),
            slots,
            capacity,
            overflow,
            progress: Arc::new(Progress::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Creates an unbounded queue.
    pub fn unbounded() -> Self {
        Self::new(0, OverflowPolicy::Block)
    }

    /// Inserts `item` at the tail.
    ///
    /// ### Full queue
    /// - [`OverflowPolicy::Block`]: suspends until a consumer frees a slot
    /// - [`OverflowPolicy::Reject`]: fails with [`QueueError::Full`]
    ///
    /// Fails with [`QueueError::Closed`] once the queue is closed, including
    /// producers that were blocked when `close` happened.
    pub async fn enqueue(&self, item: T) -> Result<(), Rejected<T>> {
        let slot = match self.overflow {
            OverflowPolicy::Block => self.acquire_slot().await,
            OverflowPolicy::Reject => self.try_acquire_slot(),
        };
        match slot {
            Ok(()) => self.push(item),
            Err(e) => Err(Rejected::new(item, e)),
        }
    }

    /// Inserts `item` at the tail without ever suspending.
    pub fn try_enqueue(&self, item: T) -> Result<(), Rejected<T>> {
        match self.try_acquire_slot() {
            Ok(()) => self.push(item),
            Err(e) => Err(Rejected::new(item, e)),
        }
    }

    /// Removes and returns the head item, waiting while the queue is empty.
    ///
    /// The item counts as finished as soon as it is returned.
    pub async fn dequeue(&self) -> Result<T, QueueError> {
        let (item, mut ticket) = self.dequeue_tracked().await?.into_parts();
        ticket.ack();
        Ok(item)
    }

    /// Removes the head item, waiting while the queue is empty, and keeps it
    /// unfinished until the returned [`Delivery`]'s ticket is acknowledged.
    pub async fn dequeue_tracked(&self) -> Result<Delivery<T>, QueueError> {
        loop {
            match self.available.acquire().await {
                Ok(permit) => {
                    permit.forget();
                    if let Some(item) = self.pop() {
                        return Ok(self.deliver(item));
                    }
                }
                Err(_closed) => {
                    return self
                        .pop()
                        .map(|item| self.deliver(item))
                        .ok_or(QueueError::Closed);
                }
            }
        }
    }

    /// Manually acknowledges one delivered item.
    ///
    /// Returns [`QueueError::DoubleAck`] if no item is unfinished. Prefer the
    /// [`Ticket`] handed out by [`dequeue_tracked`](Self::dequeue_tracked),
    /// which can never double-acknowledge.
    pub fn task_done(&self) -> Result<(), QueueError> {
        self.progress.finish()
    }

    /// Waits until every enqueued item has been acknowledged.
    pub async fn join(&self) {
        self.progress.wait_idle().await;
    }

    /// Stops accepting items and wakes every waiter.
    ///
    /// Idempotent. Items already buffered remain deliverable.
    pub fn close(&self) {
        {
            let _items = self.lock();
            self.closed.store(true, Ordering::Release);
        }
        self.available.close();
        if let Some(slots) = &self.slots {
            slots.close();
        }
    }

    /// Number of buffered items.
    pub fn size(&self) -> usize {
        self.lock().len()
    }

    /// Whether no item is buffered.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Whether a bounded queue has reached its capacity.
    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.size() >= self.capacity
    }

    /// Configured capacity (`0` = unbounded).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Overflow behavior of [`enqueue`](Self::enqueue).
    pub fn overflow(&self) -> OverflowPolicy {
        self.overflow
    }

    /// Items enqueued and not yet acknowledged.
    pub fn unfinished(&self) -> usize {
        self.progress.unfinished()
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn acquire_slot(&self) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        let Some(slots) = &self.slots else {
            return Ok(());
        };
        let permit = slots.acquire().await.map_err(|_| QueueError::Closed)?;
        permit.forget();
        Ok(())
    }

    fn try_acquire_slot(&self) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        let Some(slots) = &self.slots else {
            return Ok(());
        };
        match slots.try_acquire() {
            Ok(permit) => {
                permit.forget();
                Ok(())
            }
            Err(TryAcquireError::NoPermits) => Err(QueueError::Full),
            Err(TryAcquireError::Closed) => Err(QueueError::Closed),
        }
    }

    fn push(&self, item: T) -> Result<(), Rejected<T>> {
        {
            let mut items = self.lock();
            if self.is_closed() {
                return Err(Rejected::new(item, QueueError::Closed));
            }
            self.progress.begin();
            items.push_back(item);
        }
        self.available.add_permits(1);
        Ok(())
    }

    fn pop(&self) -> Option<T> {
        let item = self.lock().pop_front()?;
        if let Some(slots) = &self.slots {
            slots.add_permits(1);
        }
        Some(item)
    }

    fn deliver(&self, item: T) -> Delivery<T> {
        Delivery::new(item, Ticket::new(Arc::clone(&self.progress)))
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("size", &self.size())
            .field("capacity", &self.capacity)
            .field("overflow", &self.overflow)
            .field("unfinished", &self.unfinished())
            .field("closed", &self.is_closed())
            .finish()
    }
}
