//! # chanvisor
//!
//! **Chanvisor** is a bounded producer/consumer work-queue runtime for tokio.
//!
//! A [`Channel`] owns one [`BoundedQueue`], a fixed set of [`Consumer`]s that
//! run a user [`Callback`] for every item, and hands out [`Producer`]s. Callback
//! failures are isolated per item; consumers stop cooperatively and are forced
//! only after a grace period.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   Producer   │   │   Producer   │   │ Channel::send│
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  BoundedQueue<T>                                                  │
//! │  - FIFO buffer, capacity 0 = unbounded                            │
//! │  - OverflowPolicy::Block (suspend) / Reject (QueueError::Full)    │
//! │  - unfinished counter for join()/drain()                          │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  Consumer-0  │   │  Consumer-1  │   │  Consumer-N  │
//!     │ (dequeue loop│   │ (dequeue loop│   │ (dequeue loop│
//!     │  + callback) │   │  + callback) │   │  + callback) │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘
//!      │ Publishes: ConsumerStarted, CallbackFailed, CallbackPanicked,
//!      │            ConsumerStopped, StopTimeout, ...
//!      ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │               (capacity: ChannelConfig::bus_capacity)             │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber_listener   │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                            (per-sub queues)
//! ```
//!
//! ### Consumer loop
//! ```text
//! loop {
//!   ├─► stop requested? ─► exit "stop_requested"
//!   ├─► dequeue (parks while empty; cancellable) ─► closed & empty? exit "queue_closed"
//!   ├─► Plain:      ack, then callback(item)
//!   │   Supervised: callback(item), then ack (also on error/panic)
//!   └─► callback error/panic ─► log + publish, continue with next item
//! }
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                         |
//! |-------------------|--------------------------------------------------------------|--------------------------------------------|
//! | **Queue**         | Bounded FIFO with overflow policy and completion tracking.   | [`BoundedQueue`], [`Delivery`], [`Ticket`] |
//! | **Consumers**     | Background loops with graceful and forced stop.              | [`Consumer`], [`StopOutcome`]              |
//! | **Producers**     | Cloneable enqueue handles.                                   | [`Producer`]                               |
//! | **Channel**       | Composition root with joint lifecycle.                       | [`Channel`], [`ChannelBuilder`]            |
//! | **Callbacks**     | Per-item async handlers.                                     | [`Callback`], [`CallbackFn`]               |
//! | **Subscriber API**| Hook into runtime events (metrics, alerting, tests).         | [`Subscribe`], [`Event`]                   |
//! | **Errors**        | Typed errors for queue, callback and lifecycle failures.     | [`QueueError`], [`CallbackError`]          |
//! | **Configuration** | Centralize channel settings.                                 | [`ChannelConfig`]                          |
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use chanvisor::{CallbackError, CallbackFn, CallbackRef, Channel, ChannelConfig, ConsumerKind};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = ChannelConfig {
//!         name: "jobs".into(),
//!         capacity: 8,
//!         consumers: 2,
//!         kind: ConsumerKind::Supervised,
//!         grace: Duration::from_secs(1),
//!         ..ChannelConfig::default()
//!     };
//!
//!     let work: CallbackRef<u32> = CallbackFn::arc("square", |n: u32| async move {
//!         if n == 3 {
//!             return Err(CallbackError::fail("three is unlucky"));
//!         }
//!         println!("{n}² = {}", n * n);
//!         Ok(())
//!     });
//!
//!     let channel = Channel::new(cfg, work);
//!     channel.start()?;
//!
//!     let producer = channel.producer();
//!     for n in 1..=5 {
//!         producer.send(n).await?;
//!     }
//!
//!     let report = channel.shutdown().await;
//!     assert!(report.is_graceful());
//!     Ok(())
//! }
//! ```
mod callbacks;
mod config;
mod core;
mod error;
mod events;
mod queue;
mod subscribers;

// ---- Public re-exports ----

pub use callbacks::{Callback, CallbackFn, CallbackRef};
pub use config::{ChannelConfig, OverflowPolicy};
pub use crate::core::{
    Channel, ChannelBuilder, Consumer, ConsumerKind, ConsumerState, ConsumerStats, DEFAULT_GRACE,
    Producer, StopOutcome, StopReport,
};
pub use error::{CallbackError, ConsumerError, QueueError, Rejected, RuntimeError};
pub use events::{Bus, Event, EventKind};
pub use queue::{BoundedQueue, Delivery, Ticket};
pub use subscribers::{Subscribe, SubscriberSet};
