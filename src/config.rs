//! # Channel configuration.
//!
//! Provides [`ChannelConfig`] centralized settings for a [`Channel`](crate::Channel)
//! and [`OverflowPolicy`], the behavior of a full bounded queue.
//!
//! ## Sentinel values
//! - `capacity = 0` → unbounded queue (producers never wait)
//! - `grace = 0s` → consumers that are mid-callback are aborted right away on stop

use std::borrow::Cow;
use std::time::Duration;

use crate::core::{ConsumerKind, DEFAULT_GRACE};

/// What a bounded queue does with an enqueue when it is at capacity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Suspend the producer until a consumer frees a slot (back-pressure).
    #[default]
    Block,
    /// Fail immediately with [`QueueError::Full`](crate::QueueError::Full).
    Reject,
}

/// Configuration for a channel.
///
/// ## Field semantics
/// - `name`: Prefix for consumer names (`"{name}-{index}"`) and log fields
/// - `capacity`: Queue capacity (`0` = unbounded)
/// - `consumers`: Number of consumers created by the channel
/// - `overflow`: Behavior of `enqueue` on a full queue
/// - `kind`: Whether consumers acknowledge items after the callback
/// - `grace`: How long `stop()` waits for a consumer before forcing it
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Name used as consumer prefix and in logs.
    pub name: Cow<'static, str>,

    /// Maximum number of enqueued-but-undelivered items.
    ///
    /// - `0` = unbounded
    /// - `n > 0` = at most `n` items buffered
    pub capacity: usize,

    /// Number of consumers bound to the queue.
    pub consumers: usize,

    /// Behavior of `enqueue` on a full queue.
    pub overflow: OverflowPolicy,

    /// Plain (ack on delivery) or supervised (ack after callback) consumers.
    pub kind: ConsumerKind,

    /// Maximum time a stop waits for a consumer to exit on its own.
    ///
    /// When `stop()` is called:
    /// - the cooperative flag is set and a parked dequeue is woken
    /// - the consumer gets up to `grace` to finish its current item
    /// - after that its task is aborted and a stop timeout is logged
    pub grace: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,
}

impl ChannelConfig {
    /// Creates the default configuration for a channel with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Returns the queue capacity as an `Option`.
    ///
    /// - `None` → unbounded
    /// - `Some(n)` → at most `n` buffered items
    #[inline]
    pub fn capacity_limit(&self) -> Option<usize> {
        if self.capacity == 0 {
            None
        } else {
            Some(self.capacity)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Name of the consumer at `index`.
    pub fn consumer_name(&self, index: usize) -> String {
        format!("{}-{}", self.name, index)
    }
}

impl Default for ChannelConfig {
    /// Default configuration:
    ///
    /// - `name = "channel"`
    /// - `capacity = 0` (unbounded)
    /// - `consumers = 1`
    /// - `overflow = OverflowPolicy::Block`
    /// - `kind = ConsumerKind::Plain`
    /// - `grace = 5s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            name: Cow::Borrowed("channel"),
            capacity: 0,
            consumers: 1,
            overflow: OverflowPolicy::default(),
            kind: ConsumerKind::default(),
            grace: DEFAULT_GRACE,
            bus_capacity: 1024,
        }
    }
}
