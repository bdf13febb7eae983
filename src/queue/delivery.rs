//! # Acknowledgment of delivered items.
//!
//! A tracked dequeue hands out a [`Delivery`]: the item plus a [`Ticket`]. The
//! item stays *unfinished* in its queue until the ticket is acknowledged, which
//! is what [`BoundedQueue::join`](crate::BoundedQueue::join) waits for.
//!
//! ## Rules
//! - A ticket acknowledges **at most once**; later calls return `false`.
//! - Dropping an unacknowledged ticket acknowledges it. This covers callback
//!   failure, panics and a consumer task aborted mid-item.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

use crate::error::QueueError;

/// Unfinished-item counter shared by a queue and its tickets.
#[derive(Debug, Default)]
pub(crate) struct Progress {
    unfinished: AtomicUsize,
    done: Notify,
}

impl Progress {
    pub(crate) fn begin(&self) {
        self.unfinished.fetch_add(1, Ordering::AcqRel);
    }

    /// Marks one item finished; wakes `join` waiters when none remain.
    pub(crate) fn finish(&self) -> Result<(), QueueError> {
        let prev = self
            .unfinished
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map_err(|_| QueueError::DoubleAck)?;
        if prev == 1 {
            self.done.notify_waiters();
        }
        Ok(())
    }

    pub(crate) fn unfinished(&self) -> usize {
        self.unfinished.load(Ordering::Acquire)
    }

    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.unfinished() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Acknowledgment handle for one delivered item.
#[derive(Debug)]
pub struct Ticket {
    progress: Arc<Progress>,
    acked: bool,
}

impl Ticket {
    pub(crate) fn new(progress: Arc<Progress>) -> Self {
        Self {
            progress,
            acked: false,
        }
    }

    /// Acknowledges the item.
    ///
    /// Returns `true` on the first call and `false` if the ticket was already
    /// finalized. A late acknowledgment is never an error.
    pub fn ack(&mut self) -> bool {
        if self.acked {
            return false;
        }
        self.acked = true;

        match self.progress.finish() {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "acknowledgment skipped");
                false
            }
        }
    }

    /// Whether this ticket has been acknowledged.
    pub fn is_acked(&self) -> bool {
        self.acked
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.ack();
    }
}

/// An item taken from a queue together with its [`Ticket`].
#[derive(Debug)]
pub struct Delivery<T> {
    item: T,
    ticket: Ticket,
}

impl<T> Delivery<T> {
    pub(crate) fn new(item: T, ticket: Ticket) -> Self {
        Self { item, ticket }
    }

    /// Borrows the delivered item.
    pub fn item(&self) -> &T {
        &self.item
    }

    /// Splits the delivery so the item can be moved into a callback
    /// while the ticket is kept for the acknowledgment.
    pub fn into_parts(self) -> (T, Ticket) {
        (self.item, self.ticket)
    }
}
