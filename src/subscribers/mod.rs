//! # Observers of channel runtime events.
//!
//! This module provides the [`Subscribe`] trait and [`SubscriberSet`], which
//! delivers every [`Event`](crate::Event) published on a channel's bus to each
//! registered subscriber.
//!
//! ## Architecture
//! ```text
//! Consumer / Producer / Channel ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//!                                                                   ┌─────────┼─────────┐
//!                                                                   ▼         ▼         ▼
//!                                                                metrics    audit     custom
//! ```
//!
//! Failure logging does not depend on subscribers: consumers report callback
//! failures through `tracing` themselves. Subscribers are for programmatic
//! observation (metrics, alerting, tests).

mod set;
mod subscriber;

pub use set::SubscriberSet;
pub use subscriber::Subscribe;
