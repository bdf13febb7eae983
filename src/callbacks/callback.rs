//! # Callback abstraction.
//!
//! A [`Callback`] receives each work item a consumer dequeues. It returns
//! `Result<(), CallbackError>`; an `Err` (or a panic) is logged and counted by
//! the consumer and never stops it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CallbackError;

/// Shared handle to a callback.
pub type CallbackRef<T> = Arc<dyn Callback<T>>;

/// # Asynchronous item handler.
///
/// One callback instance is shared by every consumer of a channel, so calls may
/// run concurrently when a channel has several consumers.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use chanvisor::{Callback, CallbackError};
///
/// struct Printer;
///
/// #[async_trait]
/// impl Callback<String> for Printer {
///     fn name(&self) -> &str { "printer" }
///
///     async fn call(&self, item: String) -> Result<(), CallbackError> {
///         if item.is_empty() {
///             return Err(CallbackError::fail("empty item"));
///         }
///         println!("{item}");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Callback<T: Send + 'static>: Send + Sync + 'static {
    /// Returns a stable, human-readable callback name (used in logs and events).
    fn name(&self) -> &str;

    /// Processes one item.
    async fn call(&self, item: T) -> Result<(), CallbackError>;
}
