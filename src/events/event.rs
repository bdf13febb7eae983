//! # Runtime events emitted by channels, consumers and producers.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Channel events**: channel start/stop and shutdown requests
//! - **Consumer events**: consumer lifecycle, including forced stops
//! - **Item events**: per-item callback failures and producer rejections
//! - **Subscriber events**: overflow and panics of observers
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use chanvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::CallbackFailed)
//!     .with_consumer("jobs-0")
//!     .with_reason("boom")
//!     .with_depth(3);
//!
//! assert_eq!(ev.kind, EventKind::CallbackFailed);
//! assert_eq!(ev.consumer.as_deref(), Some("jobs-0"));
//! assert_eq!(ev.reason.as_deref(), Some("boom"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `consumer`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `consumer`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Channel events ===
    /// Channel started its consumers.
    ///
    /// Sets:
    /// - `consumer`: channel name
    /// - `depth`: queue size at start
    ChannelStarted,

    /// Shutdown requested (OS signal observed or `shutdown()` called).
    ///
    /// Sets:
    /// - `consumer`: channel name
    ShutdownRequested,

    /// Every consumer of the channel has stopped.
    ///
    /// Sets:
    /// - `consumer`: channel name
    /// - `depth`: items left in the queue
    ChannelStopped,

    // === Consumer lifecycle events ===
    /// Consumer loop spawned.
    ///
    /// Sets:
    /// - `consumer`: consumer name
    ConsumerStarted,

    /// Cooperative stop requested for a consumer.
    ///
    /// Sets:
    /// - `consumer`: consumer name
    ConsumerStopRequested,

    /// Consumer loop exited (stop, cancellation, abort or closed queue).
    ///
    /// Sets:
    /// - `consumer`: consumer name
    /// - `reason`: exit reason ("stop_requested", "cancelled", "queue_closed", "aborted")
    ConsumerStopped,

    /// Consumer did not stop within the grace period and was aborted.
    ///
    /// Sets:
    /// - `consumer`: consumer name
    /// - `grace_ms`: configured grace (ms)
    StopTimeout,

    // === Item events ===
    /// Callback returned an error for an item; the consumer continues.
    ///
    /// Sets:
    /// - `consumer`: consumer name
    /// - `reason`: error message
    CallbackFailed,

    /// Callback panicked for an item; the consumer continues.
    ///
    /// Sets:
    /// - `consumer`: consumer name
    /// - `reason`: panic info
    CallbackPanicked,

    /// A producer could not enqueue an item (queue full or closed).
    ///
    /// Sets:
    /// - `consumer`: channel name
    /// - `reason`: error label
    /// - `depth`: queue size at rejection
    ProducerRejected,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Name of the consumer (or channel / subscriber), if applicable.
    pub consumer: Option<Arc<str>>,
    /// Human-readable reason (errors, exit reasons, overflow details).
    pub reason: Option<Arc<str>>,
    /// Stop grace period in milliseconds (compact).
    pub grace_ms: Option<u32>,
    /// Queue depth observed when the event was created.
    pub depth: Option<usize>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            consumer: None,
            reason: None,
            grace_ms: None,
            depth: None,
        }
    }

    /// Attaches a consumer (or channel / subscriber) name.
    #[inline]
    pub fn with_consumer(mut self, name: impl Into<Arc<str>>) -> Self {
        self.consumer = Some(name.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a grace duration (stored as milliseconds).
    #[inline]
    pub fn with_grace(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.grace_ms = Some(ms);
        self
    }

    /// Attaches the observed queue depth.
    #[inline]
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_consumer(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_consumer(subscriber)
            .with_reason(info)
    }

    /// Whether this event reports a dropped subscriber delivery.
    ///
    /// Such events are never re-published when they overflow themselves.
    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    /// Whether this event reports a per-item callback failure (error or panic).
    #[inline]
    pub fn is_callback_failure(&self) -> bool {
        matches!(
            self.kind,
            EventKind::CallbackFailed | EventKind::CallbackPanicked
        )
    }
}
