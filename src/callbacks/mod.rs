//! # Item callbacks.
//!
//! This module provides the per-item processing contract of consumers:
//! - [`Callback`] - trait for async item handlers
//! - [`CallbackFn`] - closure-backed implementation
//! - [`CallbackRef`] - shared reference to a callback (`Arc<dyn Callback<T>>`)

mod callback;
mod callback_fn;

pub use callback::{Callback, CallbackRef};
pub use callback_fn::CallbackFn;
