//! # Work queue and acknowledgments.
//!
//! - [`BoundedQueue`] fixed-capacity (or unbounded) FIFO with back-pressure
//! - [`Delivery`] / [`Ticket`] at-most-once acknowledgment of a dequeued item

mod bounded;
mod delivery;

pub use bounded::BoundedQueue;
pub use delivery::{Delivery, Ticket};
