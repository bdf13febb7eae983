//! Error types used by the chanvisor queue, consumers and runtime.
//!
//! This module defines the error taxonomy of the crate:
//!
//! - [`QueueError`] - errors raised by the bounded queue itself.
//! - [`Rejected`] - a failed enqueue, carrying the item back to the caller.
//! - [`CallbackError`] - errors raised (or panics caught) while a consumer runs a callback.
//! - [`ConsumerError`] - lifecycle misuse of a consumer (`start` while running).
//! - [`RuntimeError`] - channel-level conditions such as a stop that had to be forced.
//!
//! All enums provide helper methods (`as_label`, `as_message`) for logging/metrics.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the bounded queue.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The queue is at capacity and the enqueue was configured not to wait.
    #[error("queue is full")]
    Full,

    /// The queue was closed; no further items are accepted or delivered.
    #[error("queue is closed")]
    Closed,

    /// An acknowledgment arrived while no item was outstanding.
    #[error("acknowledged more items than were delivered")]
    DoubleAck,
}

impl QueueError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use chanvisor::QueueError;
    ///
    /// assert_eq!(QueueError::Full.as_label(), "queue_full");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            QueueError::Full => "queue_full",
            QueueError::Closed => "queue_closed",
            QueueError::DoubleAck => "queue_double_ack",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }
}

/// # A failed enqueue.
///
/// Returned by [`BoundedQueue::enqueue`](crate::BoundedQueue::enqueue) and
/// [`Producer::send`](crate::Producer::send). The item is handed back untouched
/// so the caller decides whether to retry or drop it.
///
/// # Example
/// ```
/// use chanvisor::{BoundedQueue, OverflowPolicy, QueueError};
///
/// let q = BoundedQueue::new(1, OverflowPolicy::Reject);
/// q.try_enqueue("a").unwrap();
///
/// let rejected = q.try_enqueue("b").unwrap_err();
/// assert_eq!(rejected.error(), QueueError::Full);
/// assert_eq!(rejected.into_inner(), "b");
/// ```
pub struct Rejected<T> {
    item: T,
    error: QueueError,
}

impl<T> Rejected<T> {
    pub(crate) fn new(item: T, error: QueueError) -> Self {
        Self { item, error }
    }

    /// Why the item was rejected.
    pub fn error(&self) -> QueueError {
        self.error
    }

    /// Returns the rejected item.
    pub fn into_inner(self) -> T {
        self.item
    }

    /// Borrows the rejected item.
    pub fn item(&self) -> &T {
        &self.item
    }
}

impl<T> fmt::Debug for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "enqueue rejected: {}", self.error)
    }
}

impl<T> std::error::Error for Rejected<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// # Errors produced while a consumer invokes its callback.
///
/// These never escape the consumer loop: they are logged, published as events,
/// counted in [`ConsumerStats`](crate::ConsumerStats), and the loop moves on.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    /// The callback returned an error for this item.
    #[error("callback failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// The callback panicked while processing this item.
    #[error("callback panicked: {info}")]
    Panicked {
        /// Panic payload, if it was a string.
        info: String,
    },
}

impl CallbackError {
    /// Builds a [`CallbackError::Failed`] from anything printable.
    ///
    /// # Example
    /// ```
    /// use chanvisor::CallbackError;
    ///
    /// let err = CallbackError::fail("connection refused");
    /// assert_eq!(err.as_label(), "callback_failed");
    /// ```
    pub fn fail(error: impl fmt::Display) -> Self {
        CallbackError::Failed {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CallbackError::Failed { .. } => "callback_failed",
            CallbackError::Panicked { .. } => "callback_panicked",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            CallbackError::Failed { error } => format!("error: {error}"),
            CallbackError::Panicked { info } => format!("panic: {info}"),
        }
    }
}

/// # Errors produced by consumer lifecycle calls.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsumerError {
    /// `start()` was called on a consumer that is already running.
    #[error("consumer {name:?} is already running")]
    AlreadyRunning {
        /// Consumer name.
        name: String,
    },

    /// `start()` was called while a previous stop is still in flight.
    #[error("consumer {name:?} is stopping")]
    Stopping {
        /// Consumer name.
        name: String,
    },
}

impl ConsumerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConsumerError::AlreadyRunning { .. } => "consumer_already_running",
            ConsumerError::Stopping { .. } => "consumer_stopping",
        }
    }
}

/// # Errors produced by the channel runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A cooperative stop did not finish within the grace period; the consumer was aborted.
    ///
    /// Treated as a warning: it is logged and reported through
    /// [`StopReport`](crate::StopReport), never returned from `stop()`.
    #[error("consumer {consumer:?} did not stop within {grace:?}; forcing cancellation")]
    StopTimeout {
        /// Consumer that had to be forced.
        consumer: String,
        /// The configured grace duration.
        grace: Duration,
    },

    /// OS signal handlers could not be installed.
    #[error("failed to listen for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use chanvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::StopTimeout { consumer: "jobs-0".into(), grace: Duration::from_secs(5) };
    /// assert_eq!(err.as_label(), "runtime_stop_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::StopTimeout { .. } => "runtime_stop_timeout",
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::StopTimeout { consumer, grace } => {
                format!("stop timeout after {grace:?}; consumer={consumer}")
            }
            RuntimeError::Signal(e) => format!("signal: {e}"),
        }
    }
}
