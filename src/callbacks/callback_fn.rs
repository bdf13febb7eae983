//! # Closure-backed callback (`CallbackFn`)
//!
//! [`CallbackFn`] wraps a closure `F: Fn(T) -> Fut`, producing a fresh future
//! per item. Shared state goes through an explicit `Arc<...>` captured by the closure.
//!
//! ## Example
//! ```rust
//! use chanvisor::{CallbackError, CallbackFn, CallbackRef};
//!
//! let cb: CallbackRef<u64> = CallbackFn::arc("square", |n: u64| async move {
//!     let _ = n * n;
//!     Ok::<_, CallbackError>(())
//! });
//!
//! assert_eq!(cb.name(), "square");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::callbacks::callback::Callback;
use crate::error::CallbackError;

/// Closure-backed callback implementation.
#[derive(Debug)]
pub struct CallbackFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> CallbackFn<F> {
    /// Creates a new closure-backed callback.
    ///
    /// Prefer [`CallbackFn::arc`] when you immediately need a [`CallbackRef`](crate::CallbackRef).
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the callback and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<T, F, Fut> Callback<T> for CallbackFn<F>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), CallbackError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, item: T) -> Result<(), CallbackError> {
        (self.f)(item).await
    }
}
